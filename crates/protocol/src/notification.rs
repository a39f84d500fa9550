//! Notification channel records and the NOIB handshake
//!
//! After the handshake the daemon streams fixed 12-byte records:
//!
//! ```text
//! [seq: u16][flags: u16][tick: u32][levels: u32]
//! ```
//!
//! `levels` is a snapshot of GPIO bank 1. The flag bits mark records that are
//! not plain level reports.

use byteorder::{ByteOrder, LittleEndian};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[cfg(feature = "async")]
use crate::codec::{Request, ResponseResult, read_response_async, write_request_async};
#[cfg(feature = "async")]
use crate::commands::NOIB;
#[cfg(feature = "async")]
use crate::error::{ProtocolError, Result};

/// Size of one notification record
pub const RECORD_SIZE: usize = 12;

/// Record reports a hardware event; id in the low five bits
pub const NTFY_FLAGS_EVENT: u16 = 1 << 7;
/// Record is a keep-alive tick
pub const NTFY_FLAGS_ALIVE: u16 = 1 << 6;
/// Record is a watchdog timeout; gpio in the low five bits
pub const NTFY_FLAGS_WDOG: u16 = 1 << 5;
/// Mask for the event id / watchdog gpio
pub const NTFY_FLAGS_GPIO_MASK: u16 = 0x1F;

/// Event id of the BSC (I2C/SPI slave) peripheral
pub const BSC_EVENT_ID: u8 = 31;

/// One decoded notification record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRecord {
    pub seq: u16,
    pub flags: u16,
    pub tick: u32,
    pub levels: u32,
}

/// What a record reports, derived from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Plain level snapshot
    Levels,
    /// Hardware event with the given id
    Event(u8),
    /// Watchdog expired on the given gpio
    Watchdog(u8),
    /// Keep-alive with no level change implied
    KeepAlive,
}

impl NotificationRecord {
    /// Decode a record from exactly [`RECORD_SIZE`] bytes
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Self {
        Self {
            seq: LittleEndian::read_u16(&bytes[0..2]),
            flags: LittleEndian::read_u16(&bytes[2..4]),
            tick: LittleEndian::read_u32(&bytes[4..8]),
            levels: LittleEndian::read_u32(&bytes[8..12]),
        }
    }

    /// Encode to wire bytes (daemon side, tests)
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        LittleEndian::write_u16(&mut out[0..2], self.seq);
        LittleEndian::write_u16(&mut out[2..4], self.flags);
        LittleEndian::write_u32(&mut out[4..8], self.tick);
        LittleEndian::write_u32(&mut out[8..12], self.levels);
        out
    }

    /// Classify the record by its flag bits
    ///
    /// The event flag takes precedence over the watchdog and keep-alive flags.
    pub fn kind(&self) -> RecordKind {
        let low = (self.flags & NTFY_FLAGS_GPIO_MASK) as u8;
        if self.flags & NTFY_FLAGS_EVENT != 0 {
            RecordKind::Event(low)
        } else if self.flags & NTFY_FLAGS_WDOG != 0 {
            RecordKind::Watchdog(low)
        } else if self.flags & NTFY_FLAGS_ALIVE != 0 {
            RecordKind::KeepAlive
        } else {
            RecordKind::Levels
        }
    }
}

/// Async: Open an in-band notification handle on a fresh notification socket
///
/// Writes `[NOIB,0,0,0]` and reads the 16-byte reply. The reply must echo
/// `NOIB` with zero parameters; its fourth word is returned as a signed value
/// (negative means the daemon refused).
#[cfg(feature = "async")]
pub async fn open_notification_handle<S>(stream: &mut S) -> Result<i32>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    write_request_async(stream, &Request::new(NOIB, 0, 0, 0)).await?;
    let reply = read_response_async(stream).await?;

    let unexpected = ProtocolError::UnexpectedHandshake {
        command: reply.command,
        p1: reply.p1,
        p2: reply.p2,
    };
    if reply.command != NOIB || reply.p1 != 0 || reply.p2 != 0 {
        return Err(unexpected);
    }
    match reply.result {
        ResponseResult::Value(handle) => Ok(handle as i32),
        ResponseResult::Error(code) => Ok(code),
        ResponseResult::Extended(_) => Err(unexpected),
    }
}
