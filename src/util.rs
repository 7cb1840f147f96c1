//! Utility functions for Sprig.

use std::fs;
use std::path::Path;

use crate::error::{Result, SprigError};

/// Maximum blob size that can be read into memory (10 MB).
///
/// A task list that grows past this is almost certainly corrupt.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Read a blob file, refusing anything over `MAX_FILE_SIZE`.
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Read `path` unless it is larger than `limit` bytes.
///
/// # Errors
///
/// `Storage` when the file cannot be stat'ed or read, `Persistence` when it
/// exceeds the limit.
pub fn read_to_string_with_limit(path: &Path, limit: u64) -> Result<String> {
    let len = fs::metadata(path)
        .map_err(|e| SprigError::storage(path, e))?
        .len();
    if len > limit {
        return Err(SprigError::persistence(format!(
            "{} exceeds the {}-byte limit ({} bytes)",
            path.display(),
            limit,
            len
        )));
    }

    fs::read_to_string(path).map_err(|e| SprigError::storage(path, e))
}

/// Shorten `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}
