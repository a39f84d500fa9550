//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Extension length exceeds maximum allowed size
    #[error("Frame too large: {size} bytes of extension (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Extension payload length does not match the header
    #[error("Extension length mismatch: p3 says {declared}, payload has {actual}")]
    ExtensionMismatch { declared: u32, actual: usize },

    /// Reply to the notification channel open request was malformed
    #[error("Unexpected response to NOIB: cmd={command} p1={p1} p2={p2}")]
    UnexpectedHandshake { command: u32, p1: u32, p2: u32 },

    /// I/O error during frame operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
