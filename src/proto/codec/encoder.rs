use bytes::{BufMut, Bytes, BytesMut};

use crate::proto::frame::Frame;

/// A RESP encoder that converts [`Frame`] values to payload bytes.
///
/// Engines written in Rust (and the test engines in this crate) use it to
/// produce the payload handed to [`Completions::on_complete`].
///
/// [`Completions::on_complete`]: crate::Completions::on_complete
///
/// # Example
///
/// ```
/// use muxis_bridge::proto::codec::Encoder;
/// use muxis_bridge::proto::frame::Frame;
///
/// let mut encoder = Encoder::new();
/// encoder.encode(&Frame::SimpleString(b"OK".to_vec()));
/// let data = encoder.take();
/// assert_eq!(&data[..], b"+OK\r\n");
/// ```
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Creates a new encoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Encodes a frame into the internal buffer.
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to encode
    pub fn encode(&mut self, frame: &Frame) {
        match frame {
            Frame::SimpleString(s) => self.line(b'+', s),
            Frame::Error(e) => self.line(b'-', e),
            Frame::Integer(n) => self.line(b':', n.to_string().as_bytes()),
            Frame::BulkString(Some(data)) => {
                self.line(b'$', data.len().to_string().as_bytes());
                self.buf.extend_from_slice(data);
                self.buf.extend_from_slice(b"\r\n");
            }
            Frame::BulkString(None) => self.buf.extend_from_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                self.line(b'*', items.len().to_string().as_bytes());
                for item in items {
                    self.encode(item);
                }
            }
            Frame::Set(items) => {
                self.line(b'~', items.len().to_string().as_bytes());
                for item in items {
                    self.encode(item);
                }
            }
            Frame::Map(entries) => {
                self.line(b'%', entries.len().to_string().as_bytes());
                for (key, value) in entries {
                    self.encode(key);
                    self.encode(value);
                }
            }
            Frame::Null => self.buf.extend_from_slice(b"_\r\n"),
            Frame::Double(d) => self.line(b',', d.to_string().as_bytes()),
            Frame::Boolean(b) => self.line(b'#', if *b { b"t" } else { b"f" }),
        }
    }

    fn line(&mut self, marker: u8, body: &[u8]) {
        self.buf.put_u8(marker);
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Takes the encoded data from the buffer, leaving it empty.
    pub fn take(&mut self) -> Bytes {
        std::mem::take(&mut self.buf).freeze()
    }
}

/// Encodes a single frame into a fresh payload.
pub fn encode_frame(frame: &Frame) -> Bytes {
    let mut encoder = Encoder::new();
    encoder.encode(frame);
    encoder.take()
}
