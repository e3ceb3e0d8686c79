//! The boundary to the external engine.
//!
//! The engine owns connections, topology, retries and the wire protocol.
//! This crate only hands it requests tagged with a [`Token`] and waits for
//! the token to come back through [`Completions`]. Anything that can accept a
//! request and later report on it can sit behind [`Engine`]: the C ABI
//! adapter in `ffi`, an in-process Rust engine or a test double.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::core::command::Cmd;
use crate::core::completion::Completions;
use crate::core::registry::Token;

/// Error returned by the engine when it refuses a request or a connection.
///
/// A refused request never produces a completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    /// Creates an engine error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The engine's description of the refusal.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Batch options as the engine sees them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireBatchOptions {
    /// Server-side timeout for the whole batch.
    pub timeout: Option<Duration>,
    /// Retry commands that failed with a server error.
    pub retry_server_error: bool,
    /// Retry commands that failed with a connection error.
    pub retry_connection_error: bool,
}

/// What is being submitted.
#[derive(Debug, Clone, Copy)]
pub enum WirePayload<'a> {
    /// A single command.
    Command(&'a Cmd),
    /// An ordered group of commands completed by one callback.
    Batch {
        /// Commands in execution order. Atomic batches include the
        /// MULTI/EXEC markers.
        commands: &'a [Cmd],
        /// Whether the batch is a transaction.
        atomic: bool,
        /// Per-batch options.
        options: WireBatchOptions,
    },
    /// One step of a cluster-wide key scan.
    ClusterScan {
        /// Engine-side scan state id; `"0"` starts a new scan.
        cursor: &'a str,
        /// `MATCH`, `COUNT` and `TYPE` option pairs, in that order when set.
        args: &'a [Bytes],
    },
    /// Replaces the password the engine authenticates new connections with.
    UpdatePassword {
        /// The new password, or `None` to drop it.
        password: Option<&'a str>,
        /// Re-authenticate the open connections right away.
        immediate_auth: bool,
    },
}

/// One request handed to the engine.
///
/// Borrowed data only has to outlive the [`Engine::submit`] call; the engine
/// copies what it needs before returning.
#[derive(Debug, Clone, Copy)]
pub struct WireRequest<'a> {
    /// The command or batch.
    pub payload: WirePayload<'a>,
    /// Encoded route, or `None` for engine-chosen routing. Batches only
    /// ever carry single-node routes.
    pub route: Option<&'a [u8]>,
}

/// A live engine client.
///
/// Implementations must be callable from any thread. `submit` must not block
/// on the request's completion: the result is reported later through the
/// [`Completions`] the engine was connected with, tagged with `token`.
pub trait Engine: Send + Sync {
    /// Hands a request to the engine.
    ///
    /// # Errors
    ///
    /// An `Err` means the engine did not take the request and will never
    /// report on `token`.
    fn submit(&self, request: WireRequest<'_>, token: Token) -> Result<(), EngineError>;

    /// Releases the engine client. Called exactly once.
    ///
    /// Completions that arrive after this are ignored.
    fn close(&self);

    /// Frees the scan state behind a cursor id returned by a
    /// [`WirePayload::ClusterScan`] reply. Called at most once per id, and
    /// never after [`close`](Self::close), which frees every cursor.
    fn release_scan_cursor(&self, cursor: &str) {
        let _ = cursor;
    }
}

/// Creates engine clients.
pub trait Connector {
    /// Creates an engine client from a serialized connection request.
    ///
    /// Every completion for requests submitted to the returned engine must be
    /// reported through `completions`.
    ///
    /// # Errors
    ///
    /// Returns the engine's reason for refusing the connection.
    fn connect(
        &self,
        connection_request: &[u8],
        completions: Completions,
    ) -> Result<Box<dyn Engine>, EngineError>;
}
