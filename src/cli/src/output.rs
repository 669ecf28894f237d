//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};
use semver::Version;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Comma-separated `vX.Y.Z` list, or "-" when empty.
pub fn format_versions<'a>(versions: impl IntoIterator<Item = &'a Version>) -> String {
    let tags: Vec<String> = versions.into_iter().map(|v| format!("v{}", v)).collect();
    if tags.is_empty() {
        "-".to_string()
    } else {
        tags.join(", ")
    }
}
