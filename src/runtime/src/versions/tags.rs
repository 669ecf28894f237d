//! Release version discovery from a tag listing.

use a3s_mirror_core::error::Result;

use super::ledger::VersionLedger;

/// Whether a tag has the exact release shape `v<major>.<minor>.<patch>`.
///
/// Components with a leading zero are not releases.
pub fn is_release_tag(tag: &str) -> bool {
    let Some(rest) = tag.strip_prefix('v') else {
        return false;
    };
    let mut parts = 0;
    for part in rest.split('.') {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if part.len() > 1 && part.starts_with('0') {
            return false;
        }
        parts += 1;
    }
    parts == 3
}

/// Build a ledger from every release-shaped tag; other tags are ignored.
pub fn ledger_from_tags<I, S>(tags: I) -> Result<VersionLedger>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ledger = VersionLedger::new();
    for tag in tags {
        let tag = tag.as_ref();
        if !is_release_tag(tag) {
            continue;
        }
        ledger.set_str(tag)?;
    }
    Ok(ledger)
}
