//! Wire protocol for the pigpio daemon
//!
//! This crate covers everything that is pure byte handling: the command table
//! and its classification, the daemon error table, request/response framing
//! on the command socket, notification records on the notification socket,
//! and the reassembly buffers that turn arbitrary TCP chunks back into frames.
//!
//! # Example
//!
//! ```
//! use protocol::{Request, ResponseBuffer, ResponseResult, commands, encode_request};
//!
//! // Request: read gpio 4
//! let wire = encode_request(&Request::new(commands::READ, 4, 0, 0)).unwrap();
//! assert_eq!(wire.len(), protocol::HEADER_SIZE);
//!
//! // Response arrives in two pieces
//! let mut reply = Vec::new();
//! for word in [commands::READ, 4, 0, 1] {
//!     reply.extend_from_slice(&word.to_le_bytes());
//! }
//! let mut buf = ResponseBuffer::new();
//! buf.push(&reply[..10]);
//! assert!(buf.next_frame().unwrap().is_none());
//! buf.push(&reply[10..]);
//! let frame = buf.next_frame().unwrap().unwrap();
//! assert_eq!(frame.result, ResponseResult::Value(1));
//! ```

pub mod buffer;
pub mod codec;
pub mod commands;
pub mod error;
pub mod error_codes;
pub mod notification;

pub use buffer::{RecordBuffer, ResponseBuffer};
pub use codec::{
    HEADER_SIZE, MAX_EXTENSION_SIZE, Request, ResponseFrame, ResponseResult, decode_request,
    decode_response, encode_request, encode_response,
};

#[cfg(feature = "async")]
pub use codec::{read_request_async, read_response_async, write_request_async};
#[cfg(feature = "async")]
pub use notification::open_notification_handle;

pub use commands::{can_never_fail, command_name, has_extended_request, has_extended_response};
pub use error::{ProtocolError, Result};
pub use error_codes::{CUSTOM_ERR_RANGE, ErrorCode, PIGIF_ERR_RANGE, lookup_error};
pub use notification::{
    BSC_EVENT_ID, NTFY_FLAGS_ALIVE, NTFY_FLAGS_EVENT, NTFY_FLAGS_WDOG, NotificationRecord,
    RECORD_SIZE, RecordKind,
};
