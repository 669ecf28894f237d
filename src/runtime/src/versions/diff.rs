//! Version diff resolver.
//!
//! Walks minor lines from the destination's oldest line up to the source's
//! latest line and collects every source version the destination lacks.

use std::fmt;
use std::str::FromStr;

use a3s_mirror_core::error::{MirrorError, Result};
use semver::Version;

use super::ledger::{parse_version, VersionLedger, VersionLine};

/// Number of minor lines kept behind the latest one when no floor is given.
pub const AUTO_FLOOR_DISTANCE: u64 = 5;

/// Caller-supplied floor for a destination that has nothing to compare.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MinVersion {
    /// `latestMinor - 5` of the source
    #[default]
    Auto,
    /// The source's latest line only
    Latest,
    /// An explicit version
    Exact(Version),
}

impl MinVersion {
    /// Floor version to seed an empty destination ledger with.
    pub fn floor(&self, source: &VersionLedger) -> Result<Version> {
        match self {
            MinVersion::Exact(v) => Ok(v.clone()),
            MinVersion::Latest | MinVersion::Auto => {
                let latest = source.latest().ok_or_else(|| MirrorError::NoVersions {
                    location: "source".to_string(),
                })?;
                let minor = match self {
                    MinVersion::Auto => latest.minor.saturating_sub(AUTO_FLOOR_DISTANCE),
                    _ => latest.minor,
                };
                Ok(Version::new(latest.major, minor, 0))
            }
        }
    }
}

impl FromStr for MinVersion {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Ok(MinVersion::Auto),
            "latest" => Ok(MinVersion::Latest),
            other => Ok(MinVersion::Exact(parse_version(other)?)),
        }
    }
}

impl fmt::Display for MinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinVersion::Auto => write!(f, "auto"),
            MinVersion::Latest => write!(f, "latest"),
            MinVersion::Exact(v) => write!(f, "v{}", v),
        }
    }
}

/// Seed the destination ledger when it cannot be compared against.
///
/// An empty ledger, or a destination that is not a live registry, is
/// replaced by a ledger holding only the floor derived from `min`.
pub fn seed_destination(
    source: &VersionLedger,
    destination: VersionLedger,
    destination_is_live: bool,
    min: &MinVersion,
) -> Result<VersionLedger> {
    if !destination.is_empty() && destination_is_live {
        return Ok(destination);
    }

    let floor = min.floor(source)?;
    tracing::debug!(floor = %floor, min = %min, "Seeding destination ledger");

    let mut seeded = VersionLedger::new();
    seeded.set(floor);
    Ok(seeded)
}

/// Versions that must be mirrored, ascending by line.
///
/// Fails with `MissingSourceVersion` when a line inside the walk is absent
/// from the source.
pub fn compute_diff(source: &VersionLedger, destination: &VersionLedger) -> Result<Vec<Version>> {
    let latest = source.latest().ok_or_else(|| MirrorError::NoVersions {
        location: "source".to_string(),
    })?;
    let oldest = destination.oldest().ok_or_else(|| MirrorError::NoVersions {
        location: "destination".to_string(),
    })?;

    let mut result = VersionLedger::new();
    let mut line = VersionLine::of(oldest);
    while line.floor() <= *latest {
        let source_version = source
            .get(line)
            .ok_or_else(|| MirrorError::MissingSourceVersion {
                version: line.to_string(),
            })?;

        match destination.get(line) {
            Some(dest_version) if dest_version == source_version => {}
            _ => {
                result.set(source_version.clone());
            }
        }

        line = line.next();
    }

    Ok(result.into_versions())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(versions: &[&str]) -> VersionLedger {
        versions.iter().map(|s| parse_version(s).unwrap()).collect()
    }

    fn tags(versions: &[Version]) -> Vec<String> {
        versions.iter().map(|v| format!("v{}", v)).collect()
    }

    #[test]
    fn test_min_version_from_str() {
        assert_eq!("".parse::<MinVersion>().unwrap(), MinVersion::Auto);
        assert_eq!("latest".parse::<MinVersion>().unwrap(), MinVersion::Latest);
        assert_eq!(
            "v1.44.2".parse::<MinVersion>().unwrap(),
            MinVersion::Exact(Version::new(1, 44, 2))
        );
        assert!("newest".parse::<MinVersion>().is_err());
    }

    #[test]
    fn test_floor_values() {
        let source = ledger(&["v1.46.1", "v1.47.2"]);
        assert_eq!(MinVersion::Latest.floor(&source).unwrap(), Version::new(1, 47, 0));
        assert_eq!(MinVersion::Auto.floor(&source).unwrap(), Version::new(1, 42, 0));
        assert_eq!(
            MinVersion::Exact(Version::new(1, 40, 3)).floor(&source).unwrap(),
            Version::new(1, 40, 3)
        );
    }

    #[test]
    fn test_auto_floor_does_not_underflow() {
        let source = ledger(&["v1.2.0"]);
        assert_eq!(MinVersion::Auto.floor(&source).unwrap(), Version::new(1, 0, 0));
    }

    #[test]
    fn test_floor_on_empty_source() {
        let err = MinVersion::Auto.floor(&VersionLedger::new()).unwrap_err();
        assert!(matches!(err, MirrorError::NoVersions { .. }));
    }

    #[test]
    fn test_diff_one_new_line() {
        let source = ledger(&["v1.42.3", "v1.43.0"]);
        let dest = ledger(&["v1.42.3"]);
        let diff = compute_diff(&source, &dest).unwrap();
        assert_eq!(tags(&diff), vec!["v1.43.0"]);
    }

    #[test]
    fn test_diff_equal_ledgers_is_empty() {
        let source = ledger(&["v1.42.3", "v1.43.0", "v1.44.5"]);
        let diff = compute_diff(&source, &source.clone()).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_newer_patch_is_mirrored() {
        let source = ledger(&["v1.42.4", "v1.43.0"]);
        let dest = ledger(&["v1.42.3", "v1.43.0"]);
        let diff = compute_diff(&source, &dest).unwrap();
        assert_eq!(tags(&diff), vec!["v1.42.4"]);
    }

    #[test]
    fn test_diff_missing_source_line_fails() {
        let source = ledger(&["v1.42.3", "v1.44.0"]);
        let dest = ledger(&["v1.42.3"]);
        let err = compute_diff(&source, &dest).unwrap_err();
        assert_eq!(err.to_string(), "version v1.43 from source: no such version");
    }

    #[test]
    fn test_diff_destination_ahead_is_empty() {
        let source = ledger(&["v1.42.3"]);
        let dest = ledger(&["v1.45.0"]);
        let diff = compute_diff(&source, &dest).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_never_returns_lines_outside_source() {
        let source = ledger(&["v1.40.1", "v1.41.2", "v1.42.0"]);
        let dest = ledger(&["v1.41.0"]);
        let diff = compute_diff(&source, &dest).unwrap();
        for v in &diff {
            assert_eq!(source.get_for(v), Some(v));
        }
        assert_eq!(tags(&diff), vec!["v1.41.2", "v1.42.0"]);
    }

    #[test]
    fn test_seed_latest_on_empty_destination() {
        let source = ledger(&["v1.46.1", "v1.47.2"]);
        let dest = seed_destination(&source, VersionLedger::new(), true, &MinVersion::Latest).unwrap();
        assert_eq!(dest.len(), 1);
        assert_eq!(dest.oldest(), Some(&Version::new(1, 47, 0)));

        let diff = compute_diff(&source, &dest).unwrap();
        assert_eq!(tags(&diff), vec!["v1.47.2"]);
    }

    #[test]
    fn test_seed_auto_covers_every_line() {
        let source = ledger(&[
            "v1.40.2", "v1.41.1", "v1.42.1", "v1.43.4", "v1.44.2", "v1.45.1", "v1.46.3", "v1.47.2",
        ]);
        let dest = seed_destination(&source, VersionLedger::new(), true, &MinVersion::Auto).unwrap();
        let diff = compute_diff(&source, &dest).unwrap();
        assert_eq!(
            tags(&diff),
            vec!["v1.42.1", "v1.43.4", "v1.44.2", "v1.45.1", "v1.46.3", "v1.47.2"]
        );
    }

    #[test]
    fn test_seed_ignores_contents_of_non_live_destination() {
        let source = ledger(&["v1.44.1", "v1.45.3"]);
        let stale = ledger(&["v1.45.3"]);
        let dest = seed_destination(
            &source,
            stale,
            false,
            &MinVersion::Exact(Version::new(1, 44, 0)),
        )
        .unwrap();
        let diff = compute_diff(&source, &dest).unwrap();
        assert_eq!(tags(&diff), vec!["v1.44.1", "v1.45.3"]);
    }

    #[test]
    fn test_seed_keeps_live_destination() {
        let source = ledger(&["v1.44.1", "v1.45.3"]);
        let dest = ledger(&["v1.44.1"]);
        let kept = seed_destination(&source, dest.clone(), true, &MinVersion::Latest).unwrap();
        assert_eq!(kept, dest);
    }
}
