//! Error types for the loghook wire format

use thiserror::Error;

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A field did not fit in the remaining buffer space
    #[error("Field of {needed} bytes exceeds remaining capacity of {remaining} bytes")]
    Overflow { needed: usize, remaining: usize },

    /// Buffer ended before a fixed-width field
    #[error("Insufficient data: needed {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },

    /// Text field ran to the end of the buffer without a zero byte
    #[error("Text field is missing its zero terminator")]
    MissingTerminator,

    /// Leading tag does not name a known event
    #[error("Unknown event tag: {0}")]
    UnknownEvent(u8),
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, WireError>;
