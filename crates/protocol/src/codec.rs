//! Command socket frame encoding and decoding
//!
//! Every request and response starts with the same 16-byte header of four
//! little-endian 32-bit words:
//!
//! ```text
//! [command: u32][p1: u32][p2: u32][p3: u32][extension bytes ...]
//! ```
//!
//! There is no length prefix and no request ID. Whether extension bytes
//! follow, and how `p3` is read, is decided by the command classification in
//! [`crate::commands`].
//!
//! Decoding never treats a short buffer as an error: `Ok(None)` means "wait
//! for more bytes" and nothing may be consumed in that case.

use bytes::{BufMut, Bytes, BytesMut};
use byteorder::{ByteOrder, LittleEndian};

use crate::commands::{can_never_fail, has_extended_request, has_extended_response};
use crate::error::{ProtocolError, Result};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Size of the fixed request/response header
pub const HEADER_SIZE: usize = 16;

/// Largest extension payload accepted in either direction (64 KiB)
pub const MAX_EXTENSION_SIZE: usize = 1 << 16;

/// Outbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: u32,
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
    /// Extension payload, only sent for extended-request commands
    pub extension: Bytes,
}

impl Request {
    /// Create a plain request without extension bytes
    pub fn new(command: u32, p1: u32, p2: u32, p3: u32) -> Self {
        Self {
            command,
            p1,
            p2,
            p3,
            extension: Bytes::new(),
        }
    }

    /// Create an extended request; `p3` is set to the extension length
    pub fn with_extension(command: u32, p1: u32, p2: u32, extension: impl Into<Bytes>) -> Self {
        let extension = extension.into();
        Self {
            command,
            p1,
            p2,
            p3: extension.len() as u32,
            extension,
        }
    }

    /// Number of bytes this request occupies on the wire
    pub fn encoded_len(&self) -> usize {
        if has_extended_request(self.command) {
            HEADER_SIZE + self.extension.len()
        } else {
            HEADER_SIZE
        }
    }
}

/// Decoded fourth word of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    /// Non-negative result (always the case for never-fail commands)
    Value(u32),
    /// Result plus trailing payload; the result word is the payload length
    Extended(Bytes),
    /// Negative daemon error code
    Error(i32),
}

/// One complete response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub command: u32,
    pub p1: u32,
    pub p2: u32,
    pub result: ResponseResult,
}

impl ResponseFrame {
    /// Number of bytes this response occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match &self.result {
            ResponseResult::Extended(ext) => HEADER_SIZE + ext.len(),
            _ => HEADER_SIZE,
        }
    }
}

fn check_extension(command: u32, p3: u32, extension: &[u8]) -> Result<()> {
    if has_extended_request(command) {
        if extension.len() > MAX_EXTENSION_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: extension.len(),
                max: MAX_EXTENSION_SIZE,
            });
        }
        if p3 as usize != extension.len() {
            return Err(ProtocolError::ExtensionMismatch {
                declared: p3,
                actual: extension.len(),
            });
        }
    } else if !extension.is_empty() {
        return Err(ProtocolError::ExtensionMismatch {
            declared: 0,
            actual: extension.len(),
        });
    }
    Ok(())
}

/// Encode a request into wire bytes
///
/// Extended-request commands must carry exactly `p3` extension bytes; other
/// commands must carry none.
///
/// # Example
/// ```
/// use protocol::{Request, commands, encode_request};
///
/// let bytes = encode_request(&Request::new(commands::READ, 4, 0, 0)).unwrap();
/// assert_eq!(bytes.len(), 16);
/// assert_eq!(&bytes[0..4], &[3, 0, 0, 0]);
/// ```
pub fn encode_request(request: &Request) -> Result<Bytes> {
    check_extension(request.command, request.p3, &request.extension)?;

    let mut buf = BytesMut::with_capacity(request.encoded_len());
    buf.put_u32_le(request.command);
    buf.put_u32_le(request.p1);
    buf.put_u32_le(request.p2);
    buf.put_u32_le(request.p3);
    if has_extended_request(request.command) {
        buf.put_slice(&request.extension);
    }
    Ok(buf.freeze())
}

/// Decode one request from the front of `buf`
///
/// Returns the request and the number of bytes it occupied, or `None` when
/// more bytes are needed. This is the daemon side of the exchange.
pub fn decode_request(buf: &[u8]) -> Result<Option<(Request, usize)>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let command = LittleEndian::read_u32(&buf[0..4]);
    let p1 = LittleEndian::read_u32(&buf[4..8]);
    let p2 = LittleEndian::read_u32(&buf[8..12]);
    let p3 = LittleEndian::read_u32(&buf[12..16]);

    let ext_len = if has_extended_request(command) {
        p3 as usize
    } else {
        0
    };
    if ext_len > MAX_EXTENSION_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: ext_len,
            max: MAX_EXTENSION_SIZE,
        });
    }
    if buf.len() < HEADER_SIZE + ext_len {
        return Ok(None);
    }

    let request = Request {
        command,
        p1,
        p2,
        p3,
        extension: Bytes::copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + ext_len]),
    };
    Ok(Some((request, HEADER_SIZE + ext_len)))
}

/// Length of the extension that follows a response header, given the header
///
/// Returns `Ok(0)` for plain responses and errors.
fn response_extension_len(command: u32, raw_p3: u32) -> Result<usize> {
    if can_never_fail(command) {
        return Ok(0);
    }
    let signed = raw_p3 as i32;
    if signed > 0 && has_extended_response(command) {
        let len = signed as usize;
        if len > MAX_EXTENSION_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_EXTENSION_SIZE,
            });
        }
        return Ok(len);
    }
    Ok(0)
}

fn classify_result(command: u32, raw_p3: u32, extension: Option<Bytes>) -> ResponseResult {
    if can_never_fail(command) {
        return ResponseResult::Value(raw_p3);
    }
    let signed = raw_p3 as i32;
    if signed < 0 {
        ResponseResult::Error(signed)
    } else if let Some(ext) = extension {
        ResponseResult::Extended(ext)
    } else {
        ResponseResult::Value(signed as u32)
    }
}

/// Decode one response from the front of `buf`
///
/// Returns the frame and the number of bytes it occupied. `Ok(None)` means
/// the header or its extension is not fully buffered yet.
///
/// # Example
/// ```
/// use protocol::{ResponseResult, commands, decode_response};
///
/// let mut wire = Vec::new();
/// for word in [commands::HWVER, 0, 0, 0xFFFF_FFFF] {
///     wire.extend_from_slice(&word.to_le_bytes());
/// }
/// let (frame, used) = decode_response(&wire).unwrap().unwrap();
/// assert_eq!(used, 16);
/// assert_eq!(frame.result, ResponseResult::Value(0xFFFF_FFFF));
/// ```
pub fn decode_response(buf: &[u8]) -> Result<Option<(ResponseFrame, usize)>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let command = LittleEndian::read_u32(&buf[0..4]);
    let p1 = LittleEndian::read_u32(&buf[4..8]);
    let p2 = LittleEndian::read_u32(&buf[8..12]);
    let raw_p3 = LittleEndian::read_u32(&buf[12..16]);

    let ext_len = response_extension_len(command, raw_p3)?;
    if buf.len() < HEADER_SIZE + ext_len {
        return Ok(None);
    }

    let extension = (ext_len > 0)
        .then(|| Bytes::copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + ext_len]));

    let frame = ResponseFrame {
        command,
        p1,
        p2,
        result: classify_result(command, raw_p3, extension),
    };
    Ok(Some((frame, HEADER_SIZE + ext_len)))
}

/// Encode a response into wire bytes (daemon side)
pub fn encode_response(frame: &ResponseFrame) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    buf.put_u32_le(frame.command);
    buf.put_u32_le(frame.p1);
    buf.put_u32_le(frame.p2);
    match &frame.result {
        ResponseResult::Value(value) => buf.put_u32_le(*value),
        ResponseResult::Error(code) => buf.put_i32_le(*code),
        ResponseResult::Extended(ext) => {
            buf.put_u32_le(ext.len() as u32);
            buf.put_slice(ext);
        }
    }
    buf.freeze()
}

/// Async: Write a request to an async writer (e.g., TCP stream)
#[cfg(feature = "async")]
pub async fn write_request_async<W>(writer: &mut W, request: &Request) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let bytes = encode_request(request)?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Async: Read exactly one response from an async reader
///
/// Reads the header, then the extension if the command classification says
/// one follows.
#[cfg(feature = "async")]
pub async fn read_response_async<R>(reader: &mut R) -> Result<ResponseFrame>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let command = LittleEndian::read_u32(&header[0..4]);
    let raw_p3 = LittleEndian::read_u32(&header[12..16]);
    let ext_len = response_extension_len(command, raw_p3)?;

    let extension = if ext_len > 0 {
        let mut ext = vec![0u8; ext_len];
        reader.read_exact(&mut ext).await?;
        Some(Bytes::from(ext))
    } else {
        None
    };

    Ok(ResponseFrame {
        command,
        p1: LittleEndian::read_u32(&header[4..8]),
        p2: LittleEndian::read_u32(&header[8..12]),
        result: classify_result(command, raw_p3, extension),
    })
}

/// Async: Read exactly one request from an async reader (daemon side)
#[cfg(feature = "async")]
pub async fn read_request_async<R>(reader: &mut R) -> Result<Request>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let command = LittleEndian::read_u32(&header[0..4]);
    let p3 = LittleEndian::read_u32(&header[12..16]);

    let extension = if has_extended_request(command) {
        let len = p3 as usize;
        if len > MAX_EXTENSION_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_EXTENSION_SIZE,
            });
        }
        let mut ext = vec![0u8; len];
        reader.read_exact(&mut ext).await?;
        Bytes::from(ext)
    } else {
        Bytes::new()
    };

    Ok(Request {
        command,
        p1: LittleEndian::read_u32(&header[4..8]),
        p2: LittleEndian::read_u32(&header[8..12]),
        p3,
        extension,
    })
}
