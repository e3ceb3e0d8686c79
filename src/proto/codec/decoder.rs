use bytes::Bytes;

use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024; // 512 MB default

/// Maximum aggregate nesting accepted in one payload.
const MAX_DEPTH: usize = 512;

/// Decodes one complete completion payload into a [`Frame`].
///
/// The engine hands over the whole reply at once, so a truncated payload or
/// trailing bytes after the first value are protocol errors rather than a
/// request for more data. Runs in O(payload length) and never blocks, which
/// keeps it safe to call from the engine's callback thread.
///
/// # Example
///
/// ```
/// use muxis_bridge::proto::codec::decode_payload;
/// use muxis_bridge::proto::frame::Frame;
///
/// let frame = decode_payload(b"+OK\r\n").unwrap();
/// assert_eq!(frame, Frame::SimpleString(b"OK".to_vec()));
/// ```
pub fn decode_payload(payload: &[u8]) -> Result<Frame> {
    Decoder::new(payload).decode_complete()
}

/// A RESP2/RESP3 decoder over a borrowed, complete payload.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    max_frame_size: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_frame_size(buf, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a decoder with a custom maximum frame size.
    ///
    /// # Arguments
    ///
    /// * `buf` - The complete payload
    /// * `max_frame_size` - Maximum size in bytes for a single payload
    pub fn with_max_frame_size(buf: &'a [u8], max_frame_size: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_frame_size,
        }
    }

    /// Decodes exactly one value and requires the payload to end right after it.
    pub fn decode_complete(mut self) -> Result<Frame> {
        if self.buf.len() > self.max_frame_size {
            return Err(protocol("payload exceeds maximum frame size"));
        }
        let frame = self.decode(0)?;
        if self.pos != self.buf.len() {
            return Err(protocol(format!(
                "{} trailing bytes after payload",
                self.buf.len() - self.pos
            )));
        }
        Ok(frame)
    }

    fn decode(&mut self, depth: usize) -> Result<Frame> {
        if depth > MAX_DEPTH {
            return Err(protocol("payload nesting too deep"));
        }
        let marker = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| protocol("truncated payload"))?;
        self.pos += 1;

        match marker {
            b'+' => Ok(Frame::SimpleString(self.read_line()?.to_vec())),
            b'-' => Ok(Frame::Error(self.read_line()?.to_vec())),
            b':' => Ok(Frame::Integer(self.read_int()?)),
            b'$' => self.decode_bulk_string(),
            b'*' => match self.read_len()? {
                None => Ok(Frame::Null),
                Some(len) => Ok(Frame::Array(self.decode_items(len, depth)?)),
            },
            b'~' => {
                let len = self.read_len()?.unwrap_or(0);
                Ok(Frame::Set(self.decode_items(len, depth)?))
            }
            b'%' => self.decode_map(depth),
            b'_' => {
                self.read_line()?;
                Ok(Frame::Null)
            }
            b',' => self.decode_double(),
            b'#' => match self.read_line()? {
                b"t" => Ok(Frame::Boolean(true)),
                b"f" => Ok(Frame::Boolean(false)),
                _ => Err(protocol("invalid boolean")),
            },
            other => Err(protocol(format!("unknown frame type: {}", other as char))),
        }
    }

    fn decode_bulk_string(&mut self) -> Result<Frame> {
        let len = match self.read_len()? {
            None => return Ok(Frame::BulkString(None)),
            Some(len) => len,
        };

        if len > self.max_frame_size {
            return Err(protocol("bulk string length exceeds maximum frame size"));
        }

        let end = self.pos + len;
        if self.buf.len() < end + 2 {
            return Err(protocol("truncated bulk string"));
        }
        if &self.buf[end..end + 2] != b"\r\n" {
            return Err(protocol("bulk string not terminated by CRLF"));
        }
        let data = Bytes::copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end + 2;
        Ok(Frame::BulkString(Some(data)))
    }

    fn decode_items(&mut self, len: usize, depth: usize) -> Result<Vec<Frame>> {
        // Every item needs at least 3 bytes, so a larger count cannot fit.
        if len > self.remaining() / 3 {
            return Err(protocol("aggregate length exceeds payload"));
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.decode(depth + 1)?);
        }
        Ok(items)
    }

    fn decode_map(&mut self, depth: usize) -> Result<Frame> {
        let len = self.read_len()?.unwrap_or(0);
        if len > self.remaining() / 6 {
            return Err(protocol("map length exceeds payload"));
        }
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let key = self.decode(depth + 1)?;
            let value = self.decode(depth + 1)?;
            entries.push((key, value));
        }
        Ok(Frame::Map(entries))
    }

    fn decode_double(&mut self) -> Result<Frame> {
        let line = self.read_line()?;
        let text = std::str::from_utf8(line).map_err(|_| protocol("invalid double"))?;
        text.parse::<f64>()
            .map(Frame::Double)
            .map_err(|_| protocol("invalid double"))
    }

    /// Reads a length header; `-1` means a null value.
    fn read_len(&mut self) -> Result<Option<usize>> {
        let len = self.read_int()?;
        match len {
            -1 => Ok(None),
            n if n < 0 => Err(protocol("negative length")),
            n => Ok(Some(n as usize)),
        }
    }

    fn read_int(&mut self) -> Result<i64> {
        let line = self.read_line()?;
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| protocol("invalid integer"))
    }

    /// Returns the bytes up to the next CRLF and moves past it.
    fn read_line(&mut self) -> Result<&'a [u8]> {
        let end = self.find_crlf().ok_or_else(|| protocol("missing CRLF"))?;
        let line = &self.buf[self.pos..end];
        self.pos = end + 2;
        Ok(line)
    }

    /// Searches for the next CRLF sequence from the current position.
    ///
    /// # Returns
    ///
    /// Some(index of '\r') if found, None if the payload ends first
    fn find_crlf(&self) -> Option<usize> {
        let rest = &self.buf[self.pos..];
        rest.windows(2)
            .position(|w| w == b"\r\n")
            .map(|offset| self.pos + offset)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

fn protocol(message: impl Into<String>) -> Error {
    Error::Protocol {
        message: message.into(),
    }
}
