//! Upload validation and filename handling.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Extension after the last dot, if any. Not lower-cased.
pub fn extension_of(filename: &str) -> Option<&str> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// True when `filename` has an extension in `allowed` (case-insensitive).
///
/// `allowed` holds lower-case extensions without the dot.
pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
    extension_of(filename).is_some_and(|ext| {
        allowed
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext))
    })
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// The name is NFKD-decomposed so accented letters keep their base letter
/// (`bümper` -> `bumper`), then remaining non-ASCII characters are dropped.
/// Separators become spaces, whitespace runs collapse to `_` and anything
/// outside `[A-Za-z0-9_.-]` is removed. Leading and trailing `.`/`_` are
/// stripped. Returns `None` if nothing is left.
pub fn secure_filename(filename: &str) -> Option<String> {
    static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = unsafe_chars.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
