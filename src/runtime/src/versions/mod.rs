//! Release versions: ledger, tag discovery and the diff walk.

mod diff;
mod ledger;
mod tags;

pub use diff::{compute_diff, seed_destination, MinVersion, AUTO_FLOOR_DISTANCE};
pub use ledger::{parse_version, version_tag, VersionLedger, VersionLine};
pub use tags::{is_release_tag, ledger_from_tags};
