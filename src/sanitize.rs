//! Identifier sanitization for table and column names.
//!
//! Generated DDL interpolates identifiers directly (most SQL dialects cannot
//! bind them as parameters), so every name passes through [`sanitize`] first.

use std::{collections::HashSet, path::Path};

pub const PLACEHOLDER_NAME: &str = "unnamed_column";
const DIGIT_PREFIX: &str = "col_";

/// Maps arbitrary header text to `[A-Za-z0-9_]+`, not starting with a digit.
///
/// Rules, in order: replace every other character with `_`, collapse runs of
/// `_`, trim leading and trailing `_`, prefix `col_` when the result starts
/// with a digit, and fall back to `unnamed_column` when nothing is left.
pub fn sanitize(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    for ch in name.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '_' {
            ch
        } else {
            '_'
        };
        if mapped == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(mapped);
    }

    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{DIGIT_PREFIX}{trimmed}")
    } else {
        trimmed.to_string()
    }
}

pub fn is_sanitized(name: &str) -> bool {
    sanitize(name) == name
}

/// Sanitizes every header and makes the results unique within the table.
/// Comparison ignores case; later duplicates get `_2`, `_3`, ... suffixes.
pub fn sanitize_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(headers.len());
    headers
        .iter()
        .map(|header| {
            let base = sanitize(header.as_ref());
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !taken.insert(candidate.to_ascii_lowercase()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

/// Default table name for a CSV file: its sanitized, lower-cased file stem.
pub fn derive_table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    sanitize(&stem).to_ascii_lowercase()
}
