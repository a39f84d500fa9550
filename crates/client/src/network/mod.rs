//! Network subsystem
//!
//! Talks to the pigpio daemon over its two TCP sockets: the command socket
//! (request/response) and the notification socket (level reports).

pub mod connection;
pub mod info;
pub mod keepalive;
pub mod notify;
pub mod pipeline;
pub mod response;
pub mod session;

// Re-export public types
pub use connection::{LinkState, SocketRole};
pub use info::{SessionInfo, hardware_for_revision};
pub use notify::{MAX_WATCHERS, WatchEvent, WatcherId};
pub use response::Reply;
pub use session::{PigpioClient, SessionEvent};
