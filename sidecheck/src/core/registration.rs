//! Registration list splitting, blanking and rejoining.
//!
//! A registration list is a delimited string of type names. Commas,
//! semicolons and whitespace are all separators; the rewritten list always
//! uses a single comma. Entries that fail the predicate are blanked so the
//! number of fields never changes.

use std::sync::LazyLock;

use regex::Regex;

/// Separator written between entries of a rewritten list.
pub const OUTPUT_SEPARATOR: &str = ",";

/// A run of whitespace, optionally around one comma or semicolon, separates
/// two entries.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[,;]\s*|\s+").expect("separator regex"));

/// Split a raw list into trimmed entries, preserving empty positions.
///
/// Outer whitespace is not a separator: `"  A B "` has two entries. An empty
/// (or all-whitespace) list has exactly one empty entry.
pub fn split_entries(raw: &str) -> Vec<&str> {
    SEPARATOR_RE
        .split(raw.trim())
        .map(str::trim)
        .collect()
}

/// Number of fields in a rewritten (comma-joined) list.
pub fn count_fields(list: &str) -> usize {
    list.split(OUTPUT_SEPARATOR).count()
}

/// Rewrite `raw`, blanking every non-empty entry for which `keep` is false.
///
/// `keep` is called once per non-empty entry, in list order.
pub fn blank_rejected<F>(raw: &str, mut keep: F) -> String
where
    F: FnMut(&str) -> bool,
{
    split_entries(raw)
        .into_iter()
        .map(|entry| {
            if entry.is_empty() || keep(entry) {
                entry
            } else {
                ""
            }
        })
        .collect::<Vec<_>>()
        .join(OUTPUT_SEPARATOR)
}
