//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing messages
#[derive(Error, Debug)]
pub enum FramingError {
    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload is not valid JSON for the expected message
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
