use bytes::Bytes;

use crate::core::request_type::RequestType;
use crate::proto::error::Error;
use crate::proto::frame::Frame;

/// A command ready to be handed to the engine.
///
/// A command is an operation identifier plus an ordered list of binary
/// arguments. Argument order is preserved exactly as added; nothing is
/// reordered or deduplicated on the way to the engine.
///
/// # Example
///
/// ```
/// use muxis_bridge::command::{get, set, Cmd};
/// use muxis_bridge::RequestType;
///
/// let cmd = Cmd::new(RequestType::Set).arg("key").arg("value");
/// let get_cmd = get("key");
/// let set_cmd = set("key", "new_value");
/// assert_eq!(cmd.args(), set("key", "value").args());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    request_type: RequestType,
    args: Vec<Bytes>,
}

impl Cmd {
    /// Creates a new command for the given operation, without arguments.
    #[inline]
    pub fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            args: Vec::new(),
        }
    }

    /// Builds a command from a raw operation code and its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] if the engine does not know `code`.
    pub fn encode<I, A>(code: u32, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let request_type = RequestType::try_from(code)?;
        Ok(Self {
            request_type,
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Appends an argument to the command.
    ///
    /// # Arguments
    ///
    /// * `arg` - The argument value
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns the operation identifier.
    #[inline]
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Returns the arguments in submission order.
    #[inline]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}

/// Creates a PING command.
#[inline]
pub fn ping() -> Cmd {
    Cmd::new(RequestType::Ping)
}

/// Creates an ECHO command.
#[inline]
pub fn echo(msg: impl Into<Bytes>) -> Cmd {
    Cmd::new(RequestType::Echo).arg(msg)
}

/// Creates a GET command.
#[inline]
pub fn get(key: impl Into<Bytes>) -> Cmd {
    Cmd::new(RequestType::Get).arg(key)
}

/// Creates a SET command.
#[inline]
pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Cmd {
    Cmd::new(RequestType::Set).arg(key).arg(value)
}

/// Creates a SET command with expiration.
///
/// # Arguments
///
/// * `key` - The key to set
/// * `value` - The value to set
/// * `expiry` - Time until the key expires
#[inline]
pub fn set_with_expiry(
    key: impl Into<Bytes>,
    value: impl Into<Bytes>,
    expiry: std::time::Duration,
) -> Cmd {
    Cmd::new(RequestType::Set)
        .arg(key)
        .arg(value)
        .arg("EX")
        .arg(expiry.as_secs().to_string())
}

/// Creates a DEL command.
#[inline]
pub fn del(key: impl Into<Bytes>) -> Cmd {
    Cmd::new(RequestType::Del).arg(key)
}

/// Creates an INCR command.
#[inline]
pub fn incr(key: impl Into<Bytes>) -> Cmd {
    Cmd::new(RequestType::Incr).arg(key)
}

/// Creates an INCRBY command.
#[inline]
pub fn incr_by(key: impl Into<Bytes>, amount: i64) -> Cmd {
    Cmd::new(RequestType::IncrBy).arg(key).arg(amount.to_string())
}

/// Creates a command whose arguments, name included, are all caller supplied.
#[inline]
pub fn custom<I, A>(args: I) -> Cmd
where
    I: IntoIterator<Item = A>,
    A: Into<Bytes>,
{
    Cmd {
        request_type: RequestType::CustomCommand,
        args: args.into_iter().map(Into::into).collect(),
    }
}

/// Creates the MULTI marker that opens an atomic batch.
#[inline]
pub(crate) fn multi() -> Cmd {
    Cmd::new(RequestType::Multi)
}

/// Creates the EXEC marker that commits an atomic batch.
#[inline]
pub(crate) fn exec() -> Cmd {
    Cmd::new(RequestType::Exec)
}

/// Fails with [`Error::Server`] if the frame is an error reply.
#[inline]
pub fn parse_frame_response(frame: Frame) -> Result<Frame, Error> {
    match frame {
        Frame::Error(e) => Err(Error::Server {
            message: String::from_utf8_lossy(&e).into_owned(),
        }),
        _ => Ok(frame),
    }
}

/// Expects a simple `OK` status reply.
pub fn parse_ok(frame: Frame) -> Result<(), Error> {
    match parse_frame_response(frame)? {
        Frame::SimpleString(s) if s == b"OK" => Ok(()),
        other => Err(Error::Protocol {
            message: format!("expected OK, got {other:?}"),
        }),
    }
}

/// Converts a frame to bytes.
#[inline]
pub fn frame_to_bytes(frame: Frame) -> Result<Option<Bytes>, Error> {
    match frame {
        Frame::BulkString(b) => Ok(b),
        Frame::SimpleString(s) => Ok(Some(Bytes::from(s))),
        Frame::Null => Ok(None),
        Frame::Error(e) => Err(Error::Server {
            message: String::from_utf8_lossy(&e).into_owned(),
        }),
        _ => Err(Error::Protocol {
            message: "unexpected frame type".to_string(),
        }),
    }
}

/// Converts a frame to an integer.
#[inline]
pub fn frame_to_int(frame: Frame) -> Result<i64, Error> {
    match frame {
        Frame::Integer(i) => Ok(i),
        Frame::BulkString(Some(b)) => std::str::from_utf8(&b)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::Protocol {
                message: "invalid integer".to_string(),
            }),
        Frame::Error(e) => Err(Error::Server {
            message: String::from_utf8_lossy(&e).into_owned(),
        }),
        _ => Err(Error::Protocol {
            message: "unexpected frame type".to_string(),
        }),
    }
}
