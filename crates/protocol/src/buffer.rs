//! Reassembly buffers for the two byte streams
//!
//! TCP delivers arbitrary chunks. Both buffers accept chunks with `push` and
//! hand back complete frames one at a time. Whatever remains after draining is
//! strictly shorter than the next complete frame.

use bytes::{Buf, BytesMut};

use crate::codec::{ResponseFrame, decode_response};
use crate::error::Result;
use crate::notification::{NotificationRecord, RECORD_SIZE};

/// Reassembles command socket responses
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    buf: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete response, if one is fully buffered
    ///
    /// A header whose extension is still in flight stays in the buffer
    /// untouched.
    pub fn next_frame(&mut self) -> Result<Option<ResponseFrame>> {
        match decode_response(&self.buf)? {
            Some((frame, used)) => {
                self.buf.advance(used);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop everything, used when the socket is torn down
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Reassembles 12-byte notification records
#[derive(Debug, Default)]
pub struct RecordBuffer {
    buf: BytesMut,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete record
    pub fn next_record(&mut self) -> Option<NotificationRecord> {
        if self.buf.len() < RECORD_SIZE {
            return None;
        }
        let mut raw = [0u8; RECORD_SIZE];
        self.buf.copy_to_slice(&mut raw);
        Some(NotificationRecord::decode(&raw))
    }

    /// Push a chunk and drain every record it completes
    pub fn drain_chunk(&mut self, chunk: &[u8]) -> Vec<NotificationRecord> {
        self.push(chunk);
        let mut records = Vec::with_capacity(self.buf.len() / RECORD_SIZE);
        while let Some(record) = self.next_record() {
            records.push(record);
        }
        records
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
