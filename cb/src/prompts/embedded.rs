//! Embedded prompts
//!
//! These are compiled into the binary from .hbs files at build time.

/// Subtask decomposition prompt
pub const DECOMPOSE: &str = include_str!("../../prompts/decompose.hbs");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "decompose" => Some(DECOMPOSE),
        _ => None,
    }
}
