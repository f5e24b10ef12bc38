//! Error types for oxitag
//!
//! Structural problems abort the whole read or write. Data-quality issues
//! found while decoding existing bytes (unknown genre ids, odd picture types)
//! are not errors: they are logged through `tracing` and decoding continues.

use thiserror::Error;

/// Result type alias using [`TagError`]
pub type Result<T> = std::result::Result<T, TagError>;

#[derive(Error, Debug)]
pub enum TagError {
    /// A declared length disagrees with the bytes that are actually there
    #[error("malformed container at byte {offset}: {reason}")]
    MalformedContainer { offset: u64, reason: String },

    /// The generic key has no mapping in the concrete format
    #[error("field key `{key}` is not supported by {format}")]
    UnsupportedKey { key: String, format: &'static str },

    /// A value was rejected while building a field, before anything was written
    #[error("invalid field value: {0}")]
    InvalidFieldValue(String),

    /// Structurally valid input that this engine does not handle
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown file format")]
    UnknownFormat,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagError {
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        TagError::MalformedContainer {
            offset,
            reason: reason.into(),
        }
    }

    /// Maps a short read to a malformed-container error at `offset`.
    pub(crate) fn from_read(err: std::io::Error, offset: u64, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TagError::malformed(offset, format!("{} runs past the end of the data", what))
        } else {
            TagError::Io(err)
        }
    }
}
