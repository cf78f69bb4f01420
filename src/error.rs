//! Typed errors for the article database format.
//!
//! The rest of the application propagates `Box<dyn Error>`; parse failures
//! get their own enum so callers can report the offending line.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("line {line}: article block is missing the `{field}` field")]
    MissingField { line: usize, field: &'static str },

    #[error("line {line}: invalid Date_Processed `{value}` (expected YYYY-MM-DD)")]
    InvalidDate { line: usize, value: String },

    #[error("database I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
