//! src/utils.rs
//! Shared utility functions used across the codebase

use std::fmt::Display;

/// Extension trait for Result to simplify error conversion to String.
///
/// Tool handlers return `Result<String, String>`; use `.str_err()?` instead
/// of `.map_err(|e| e.to_string())?`.
pub trait ResultExt<T, E> {
    /// Convert the error type to String.
    fn str_err(self) -> Result<T, String>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    fn str_err(self) -> Result<T, String> {
        self.map_err(|e| e.to_string())
    }
}

/// Keep at most `max_chars` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string to `max_chars` characters with ellipsis.
///
/// The result is at most `max_chars + 3` characters long.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
