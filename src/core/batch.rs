//! Batches: transactions and pipelines.
//!
//! A [`Batch`] queues commands client-side and sends them as a single
//! request with a single completion. An atomic batch is wrapped in
//! MULTI/EXEC and either succeeds as a whole or fails as a whole. A pipeline
//! keeps per-command outcomes: a failed command leaves an error marker in
//! its own slot and every other slot intact.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::cluster::route::{Route, SingleNodeRoute};
use crate::core::command::{self, Cmd};
use crate::core::dispatch::Dispatcher;
use crate::core::engine::WireBatchOptions;
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// An ordered group of commands executed as one request.
///
/// # Example
///
/// ```
/// use muxis_bridge::command::{get, incr, set};
/// use muxis_bridge::Batch;
///
/// let batch = Batch::transaction()
///     .add(set("counter", "1"))
///     .add(incr("counter"))
///     .add(get("counter"));
/// assert_eq!(batch.len(), 3);
/// assert!(batch.is_atomic());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Cmd>,
    atomic: bool,
    executed: bool,
}

impl Batch {
    /// Creates an empty batch. `atomic` selects a transaction over a
    /// pipeline.
    #[inline]
    pub fn new(atomic: bool) -> Self {
        Self {
            commands: Vec::new(),
            atomic,
            executed: false,
        }
    }

    /// Creates an empty atomic batch.
    #[inline]
    pub fn transaction() -> Self {
        Self::new(true)
    }

    /// Creates an empty non-atomic batch.
    #[inline]
    pub fn pipeline() -> Self {
        Self::new(false)
    }

    /// Queues a command, builder style.
    #[inline]
    pub fn add(mut self, cmd: Cmd) -> Self {
        self.commands.push(cmd);
        self
    }

    /// Queues a command in place.
    #[inline]
    pub fn push(&mut self, cmd: Cmd) -> &mut Self {
        self.commands.push(cmd);
        self
    }

    /// Number of queued commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns `true` for transactions.
    #[inline]
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Returns `true` once the batch has been handed to a client for
    /// execution.
    #[inline]
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Queued commands, in execution order.
    #[inline]
    pub fn commands(&self) -> &[Cmd] {
        &self.commands
    }

    /// Drops every queued command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExecuted`] if the batch was executed.
    pub fn discard(&mut self) -> Result<()> {
        if self.executed {
            return Err(Error::AlreadyExecuted);
        }
        self.commands.clear();
        Ok(())
    }

    /// Commands as they cross the boundary, with MULTI/EXEC around
    /// transactions.
    fn wire_commands(&self) -> Vec<Cmd> {
        if !self.atomic {
            return self.commands.clone();
        }
        let mut wrapped = Vec::with_capacity(self.commands.len() + 2);
        wrapped.push(command::multi());
        wrapped.extend(self.commands.iter().cloned());
        wrapped.push(command::exec());
        wrapped
    }
}

/// Per-execution options of a [`Batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    timeout: Option<Duration>,
    raise_on_error: bool,
    route: Option<SingleNodeRoute>,
    retry_server_error: bool,
    retry_connection_error: bool,
}

impl BatchOptions {
    /// Creates default options: engine timeout, errors kept in their slots,
    /// engine-chosen route, no retries.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-side timeout for the whole batch, enforced by the engine.
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Return the first failed pipeline command as an error instead of
    /// keeping error markers in the result.
    #[inline]
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Sends the batch to one specific node.
    #[inline]
    pub fn route(mut self, route: SingleNodeRoute) -> Self {
        self.route = Some(route);
        self
    }

    /// Lets the engine retry pipeline commands that failed with a server
    /// error such as TRYAGAIN.
    #[inline]
    pub fn retry_server_error(mut self, retry: bool) -> Self {
        self.retry_server_error = retry;
        self
    }

    /// Lets the engine retry the pipeline after a connection error.
    #[inline]
    pub fn retry_connection_error(mut self, retry: bool) -> Self {
        self.retry_connection_error = retry;
        self
    }

    fn validate(&self, atomic: bool) -> Result<()> {
        if atomic && (self.retry_server_error || self.retry_connection_error) {
            return Err(Error::InvalidArgument {
                message: "retry strategies are not supported for atomic batches".to_string(),
            });
        }
        Ok(())
    }

    fn wire(&self) -> WireBatchOptions {
        WireBatchOptions {
            timeout: self.timeout,
            retry_server_error: self.retry_server_error,
            retry_connection_error: self.retry_connection_error,
        }
    }
}

impl Dispatcher {
    /// Executes `batch` and waits for its single completion.
    ///
    /// Returns `Ok(None)` when a transaction was aborted because a watched
    /// key changed. Otherwise the result has one entry per queued command,
    /// in order.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyBatch`] if nothing is queued; the engine is not called.
    /// - [`Error::Server`] if any command of a transaction failed, or if
    ///   `raise_on_error` is set and a pipeline command failed.
    /// - [`Error::Protocol`] if the reply does not line up with the commands.
    /// - Any error of a single command submission.
    #[instrument(skip(self, batch, options), fields(len = batch.len(), atomic = batch.is_atomic()), level = "debug")]
    pub async fn execute(
        &self,
        batch: &mut Batch,
        options: &BatchOptions,
    ) -> Result<Option<Vec<Frame>>> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        options.validate(batch.atomic)?;
        batch.executed = true;

        let route = options.route.clone().map(Route::from);
        let commands = batch.wire_commands();
        let pending =
            self.submit_batch(&commands, batch.atomic, options.wire(), route.as_ref())?;
        let reply = pending.await?;

        if batch.atomic {
            decode_transaction(reply, batch.len())
        } else {
            decode_pipeline(reply, batch.len(), options.raise_on_error).map(Some)
        }
    }
}

fn decode_transaction(reply: Frame, expected: usize) -> Result<Option<Vec<Frame>>> {
    let items = match reply {
        reply if reply.is_null() => {
            debug!("transaction aborted by a watched key");
            return Ok(None);
        }
        Frame::Error(e) => {
            return Err(Error::Server {
                message: String::from_utf8_lossy(&e).into_owned(),
            })
        }
        Frame::Array(items) => items,
        other => return Err(unexpected_reply(&other)),
    };
    check_alignment(items.len(), expected)?;
    if let Some((index, message)) = first_error(&items) {
        return Err(Error::Server {
            message: format!("transactional command {index} failed: {message}"),
        });
    }
    Ok(Some(items))
}

fn decode_pipeline(reply: Frame, expected: usize, raise_on_error: bool) -> Result<Vec<Frame>> {
    let items = match reply {
        Frame::Array(items) => items,
        Frame::Error(e) => {
            return Err(Error::Server {
                message: String::from_utf8_lossy(&e).into_owned(),
            })
        }
        other => return Err(unexpected_reply(&other)),
    };
    check_alignment(items.len(), expected)?;
    if raise_on_error {
        if let Some((index, message)) = first_error(&items) {
            return Err(Error::Server {
                message: format!("pipeline command {index} failed: {message}"),
            });
        }
    }
    Ok(items)
}

fn check_alignment(received: usize, expected: usize) -> Result<()> {
    if received != expected {
        return Err(Error::Protocol {
            message: format!(
                "response misaligned: received {received} responses for {expected} commands"
            ),
        });
    }
    Ok(())
}

fn first_error(items: &[Frame]) -> Option<(usize, String)> {
    items
        .iter()
        .enumerate()
        .find_map(|(index, item)| item.error_message().map(|message| (index, message)))
}

fn unexpected_reply(reply: &Frame) -> Error {
    Error::Protocol {
        message: format!("unexpected batch reply: {reply:?}"),
    }
}
