//! Client error types
//!
//! Errors are `Clone` so the same value can complete a request and ride the
//! session event channel.

use std::sync::Arc;

use protocol::{CUSTOM_ERR_RANGE, PIGIF_ERR_RANGE, ProtocolError, command_name, lookup_error};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Daemon returned a negative result code
    #[error("{command}: {message} ({symbol} {code})")]
    Pigpio {
        code: i32,
        symbol: &'static str,
        message: &'static str,
        command: &'static str,
    },

    /// Negative result code missing from the error table
    #[error("Internal error: unknown pigpio error code {code} from {command}")]
    UnknownErrorCode { code: i32, command: &'static str },

    #[error("Not connected to pigpio daemon")]
    NotConnected,

    /// Connection torn down before the response arrived
    #[error("Request abandoned: connection closed before a response arrived")]
    Abandoned,

    #[error("Notification limit reached, cannot add this notifier")]
    WatcherLimit,

    #[error("Unknown notification watcher {0}")]
    UnknownWatcher(u32),

    #[error("Could not connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Could not connect, retry timeout expired.")]
    RetryTimeout,

    #[error("Notification handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Session task has exited
    #[error("Session closed")]
    SessionClosed,
}

impl ClientError {
    /// Decode a negative daemon result for `command`
    pub fn from_code(code: i32, command: u32) -> Self {
        let command = command_name(command).unwrap_or("UNKNOWN");
        match lookup_error(code) {
            Some(entry) => ClientError::Pigpio {
                code,
                symbol: entry.symbol,
                message: entry.message,
                command,
            },
            None => ClientError::UnknownErrorCode { code, command },
        }
    }

    /// Daemon error code, when this is a daemon error
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::Pigpio { code, .. } | ClientError::UnknownErrorCode { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// True for codes in the interface library or custom ranges
    pub fn is_reserved_range(&self) -> bool {
        self.code().is_some_and(|code| {
            (PIGIF_ERR_RANGE.0..=PIGIF_ERR_RANGE.1).contains(&code)
                || (CUSTOM_ERR_RANGE.0..=CUSTOM_ERR_RANGE.1).contains(&code)
        })
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(Arc::new(err))
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io) => ClientError::Io(Arc::new(io)),
            ProtocolError::UnexpectedHandshake { .. } => ClientError::Handshake(err.to_string()),
            ProtocolError::ExtensionMismatch { .. } => ClientError::InvalidArgument(err.to_string()),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::commands::{READ, WRITE};

    #[test]
    fn test_from_known_code() {
        let err = ClientError::from_code(-2, WRITE);
        match &err {
            ClientError::Pigpio {
                code,
                symbol,
                command,
                ..
            } => {
                assert_eq!(*code, -2);
                assert_eq!(*symbol, "PI_BAD_USER_GPIO");
                assert_eq!(*command, "WRITE");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.code(), Some(-2));
        assert!(err.to_string().contains("PI_BAD_USER_GPIO"));
    }

    #[test]
    fn test_unknown_code_is_internal() {
        let err = ClientError::from_code(-9999, READ);
        assert!(matches!(err, ClientError::UnknownErrorCode { code: -9999, .. }));
        assert!(err.to_string().starts_with("Internal error"));
    }

    #[test]
    fn test_reserved_ranges() {
        assert!(ClientError::from_code(-2050, READ).is_reserved_range());
        assert!(ClientError::from_code(-3500, READ).is_reserved_range());
        assert!(!ClientError::from_code(-3, READ).is_reserved_range());
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: ClientError = ProtocolError::UnexpectedHandshake {
            command: 3,
            p1: 0,
            p2: 0,
        }
        .into();
        assert!(matches!(err, ClientError::Handshake(_)));

        let err: ClientError = ProtocolError::ExtensionMismatch {
            declared: 4,
            actual: 2,
        }
        .into();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }
}
