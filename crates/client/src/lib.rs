//! Client for the pigpio daemon's socket interface
//!
//! A [`PigpioClient`] drives one session with a pigpio daemon: the command
//! socket for requests, the notification socket for GPIO level reports. The
//! [`gpio`] module wraps single pins on top of it, and [`config`] loads the
//! connection settings from TOML.

pub mod config;
pub mod error;
pub mod gpio;
pub mod network;

pub use config::{ClientConfig, SessionConfig};
pub use error::{ClientError, Result};
pub use gpio::{Gpio, LevelEvent, Mode, Pull, Requester};
pub use network::{PigpioClient, Reply, SessionEvent, SessionInfo, WatchEvent, WatcherId};
