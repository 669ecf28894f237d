//! Version ledger: best known patch per `major.minor` line.

use std::collections::BTreeMap;
use std::fmt;

use a3s_mirror_core::error::{MirrorError, Result};
use semver::Version;

/// A `(major, minor)` release series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionLine {
    pub major: u64,
    pub minor: u64,
}

impl VersionLine {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// The line a version belongs to.
    pub fn of(version: &Version) -> Self {
        Self::new(version.major, version.minor)
    }

    /// First version of the line (`major.minor.0`).
    pub fn floor(&self) -> Version {
        Version::new(self.major, self.minor, 0)
    }

    /// The next minor line.
    pub fn next(&self) -> Self {
        Self::new(self.major, self.minor + 1)
    }
}

impl fmt::Display for VersionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Parse a version leniently: an optional `v` prefix and a missing patch
/// (`v1.45` == `1.45.0`) are accepted.
pub fn parse_version(value: &str) -> Result<Version> {
    let trimmed = value.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let normalized = match bare.split(['-', '+']).next() {
        Some(core) if core.matches('.').count() == 1 => {
            format!("{}.0{}", core, &bare[core.len()..])
        }
        _ => bare.to_string(),
    };

    Version::parse(&normalized).map_err(|e| MirrorError::InvalidVersion {
        version: value.to_string(),
        message: e.to_string(),
    })
}

/// Tag form of a version (`v1.45.3`).
pub fn version_tag(version: &Version) -> String {
    format!("v{}", version)
}

/// Mapping from version line to the highest version observed for it.
///
/// Built fresh for every run from a tag listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionLedger {
    entries: BTreeMap<VersionLine, Version>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `version` if it beats the stored one for its line.
    ///
    /// Returns whether the ledger changed.
    pub fn set(&mut self, version: Version) -> bool {
        let line = VersionLine::of(&version);
        match self.entries.get(&line) {
            Some(old) if *old >= version => false,
            _ => {
                self.entries.insert(line, version);
                true
            }
        }
    }

    /// Parse and record a version string.
    pub fn set_str(&mut self, value: &str) -> Result<bool> {
        Ok(self.set(parse_version(value)?))
    }

    /// Best version stored for a line.
    pub fn get(&self, line: VersionLine) -> Option<&Version> {
        self.entries.get(&line)
    }

    /// Best version stored for the line of `version`, patch ignored.
    pub fn get_for(&self, version: &Version) -> Option<&Version> {
        self.get(VersionLine::of(version))
    }

    /// Highest stored version, `None` on an empty ledger.
    pub fn latest(&self) -> Option<&Version> {
        self.entries.values().max()
    }

    /// Lowest stored version, `None` on an empty ledger.
    pub fn oldest(&self) -> Option<&Version> {
        self.entries.values().min()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Stored versions in ascending line order.
    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.entries.values()
    }

    /// Consume the ledger into its versions, ascending.
    pub fn into_versions(self) -> Vec<Version> {
        self.entries.into_values().collect()
    }
}

impl FromIterator<Version> for VersionLedger {
    fn from_iter<I: IntoIterator<Item = Version>>(iter: I) -> Self {
        let mut ledger = VersionLedger::new();
        for version in iter {
            ledger.set(version);
        }
        ledger
    }
}
