//! Response assembly for the command socket

use bytes::Bytes;
use protocol::{ProtocolError, ResponseBuffer, ResponseFrame, ResponseResult};

use crate::error::{ClientError, Result};

/// Successful response to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Result word; the payload length for extended responses
    pub value: u32,
    /// Payload of an extended response, empty otherwise
    pub extension: Bytes,
}

impl Reply {
    pub fn value(value: u32) -> Self {
        Self {
            value,
            extension: Bytes::new(),
        }
    }
}

/// Turn a decoded frame into the caller-facing result
pub fn frame_result(frame: &ResponseFrame) -> Result<Reply> {
    match &frame.result {
        ResponseResult::Value(value) => Ok(Reply::value(*value)),
        ResponseResult::Extended(ext) => Ok(Reply {
            value: ext.len() as u32,
            extension: ext.clone(),
        }),
        ResponseResult::Error(code) => Err(ClientError::from_code(*code, frame.command)),
    }
}

/// Frames pulled out of one received chunk
#[derive(Debug, Default)]
pub struct Assembled {
    pub frames: Vec<ResponseFrame>,
    /// Framing violation that stopped extraction
    pub error: Option<ProtocolError>,
}

/// Folds command socket chunks into complete response frames
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    buffer: ResponseBuffer,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and extract every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Assembled {
        self.buffer.push(chunk);
        let mut assembled = Assembled::default();
        loop {
            match self.buffer.next_frame() {
                Ok(Some(frame)) => assembled.frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    assembled.error = Some(e);
                    break;
                }
            }
        }
        assembled
    }

    /// Bytes waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
