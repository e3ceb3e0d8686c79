use thiserror::Error;

/// Result type alias for muxis-bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`], following where the failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input caught before the engine boundary was touched.
    Encoding,
    /// The boundary call itself could not be issued.
    Dispatch,
    /// Reported by the engine through the failure callback.
    Runtime,
    /// Synthesized because the client is closed or closing.
    Closing,
    /// Misuse of a batch.
    Batch,
}

/// Errors surfaced by the dispatch layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A `host:port` string did not have exactly one colon, a non-empty host
    /// and a numeric port.
    #[error("invalid address: {address:?}")]
    InvalidAddress {
        /// The rejected address string.
        address: String,
    },

    /// The operation code is not one the engine understands.
    #[error("unsupported operation: {code}")]
    UnsupportedOperation {
        /// The rejected operation code.
        code: u32,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// The connection request could not be serialized.
    #[error("config error: {source}")]
    Config {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The engine refused the request before taking ownership of it.
    #[error("dispatch error: {message}")]
    Dispatch {
        /// Description of the refusal.
        message: String,
    },

    /// The server returned an error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// A transaction was aborted by the server.
    #[error("transaction aborted: {message}")]
    ExecAbort {
        /// Error message from the engine.
        message: String,
    },

    /// The request did not complete in time.
    #[error("timeout: {message}")]
    Timeout {
        /// Error message from the engine or the caller deadline.
        message: String,
    },

    /// The engine lost its connection while the request was in flight.
    #[error("connection error: {message}")]
    Connection {
        /// Error message from the engine.
        message: String,
    },

    /// A completion payload could not be decoded.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The client is closed, or was closed while the request was pending.
    #[error("client closing: {message}")]
    Closing {
        /// Description of the operation that was cut short.
        message: String,
    },

    /// `discard` was called on a batch that was already executed.
    #[error("batch already executed")]
    AlreadyExecuted,

    /// An empty batch was executed.
    #[error("batch is empty")]
    EmptyBatch,
}

impl Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAddress { .. }
            | Error::UnsupportedOperation { .. }
            | Error::InvalidArgument { .. }
            | Error::Config { .. } => ErrorKind::Encoding,
            Error::Dispatch { .. } => ErrorKind::Dispatch,
            Error::Server { .. }
            | Error::ExecAbort { .. }
            | Error::Timeout { .. }
            | Error::Connection { .. }
            | Error::Protocol { .. } => ErrorKind::Runtime,
            Error::Closing { .. } => ErrorKind::Closing,
            Error::AlreadyExecuted | Error::EmptyBatch => ErrorKind::Batch,
        }
    }

    /// Shorthand for a [`Error::Closing`] error.
    pub(crate) fn closing(message: impl Into<String>) -> Self {
        Error::Closing {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by the client closing.
    pub fn is_closing(&self) -> bool {
        matches!(self, Error::Closing { .. })
    }
}

/// Failure kind reported by the engine alongside an error message.
///
/// Mirrors the engine's own enum, so the discriminants are part of the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestErrorType {
    /// Server error or anything without a more specific kind.
    Unspecified = 0,
    /// A transaction was aborted.
    ExecAbort = 1,
    /// The engine-side request timeout expired.
    Timeout = 2,
    /// The connection dropped.
    Disconnect = 3,
}

impl RequestErrorType {
    /// Builds the caller-facing error for a failure of this kind.
    pub fn into_error(self, message: String) -> Error {
        match self {
            RequestErrorType::Unspecified => Error::Server { message },
            RequestErrorType::ExecAbort => Error::ExecAbort { message },
            RequestErrorType::Timeout => Error::Timeout { message },
            RequestErrorType::Disconnect => Error::Connection { message },
        }
    }
}
