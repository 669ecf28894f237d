//! A3S Mirror Runtime - incremental release mirroring engine.
//!
//! Computes which release versions a destination lacks, resolves release
//! channels, deduplicates module images and copies everything between
//! registries, directories and tar.gz archives.

#![allow(clippy::result_large_err)]

pub mod cancel;
pub mod channels;
pub mod copy;
pub mod dedup;
pub mod oci;
pub mod pipeline;
pub mod transfer;
pub mod versions;

// Re-export common types
pub use cancel::{CancelHandle, Cancellation};
pub use channels::{merge_release_versions, resolve_channels, ChannelVersion};
pub use copy::CopyOrchestrator;
pub use dedup::{deduplicate, WorkItem};
pub use oci::{ArchiveTransport, ImageLocator, ImageReference, RegistryAuth, RegistryClient};
pub use oci::{RegistryLocation, TransportKind};
pub use pipeline::{MirrorPipeline, MirrorPlan, MirrorReport};
pub use transfer::{CopyOptions, ImageTransfer, ListOptions, PolicyContext, TagLister};
pub use versions::{compute_diff, seed_destination, MinVersion, VersionLedger, VersionLine};

/// A3S Mirror Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
