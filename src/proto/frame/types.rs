use bytes::Bytes;

/// A value delivered by the engine for a completed request.
///
/// The variants follow RESP2 and the RESP3 additions the engine can produce:
/// - SimpleString: Status responses like "OK"
/// - Error: Error replies; inside a pipelined batch this marks a failed slot
/// - Integer, Double, Boolean: Scalars
/// - BulkString: Binary-safe string data
/// - Array, Set, Map: Aggregates
/// - Null: NULL value
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string (+OK).
    SimpleString(Vec<u8>),
    /// Error (-ERR).
    Error(Vec<u8>),
    /// Integer (:1000).
    Integer(i64),
    /// Bulk string ($6\r\nfoobar).
    BulkString(Option<Bytes>),
    /// Array (*2\r\n...).
    Array(Vec<Frame>),
    /// Null ($-1, *-1 or _).
    Null,
    /// Double (,3.14).
    Double(f64),
    /// Boolean (#t / #f).
    Boolean(bool),
    /// Map (%2\r\n...), kept in reply order.
    Map(Vec<(Frame, Frame)>),
    /// Set (~2\r\n...).
    Set(Vec<Frame>),
}

impl Frame {
    /// Returns true if this frame is Null or a null bulk string.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::BulkString(None))
    }

    /// Returns true if this frame is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Returns the message of an error reply.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Frame::Error(e) => Some(String::from_utf8_lossy(e).into_owned()),
            _ => None,
        }
    }

    /// Attempts to extract an integer from this frame.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Frame::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to view this frame as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::SimpleString(s) => Some(s),
            Frame::BulkString(Some(b)) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Frame {
    fn from(value: &str) -> Self {
        Frame::BulkString(Some(Bytes::copy_from_slice(value.as_bytes())))
    }
}

impl From<i64> for Frame {
    fn from(value: i64) -> Self {
        Frame::Integer(value)
    }
}
