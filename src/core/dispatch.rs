//! Dispatch bridge: from a typed command to a pending request.
//!
//! Every data operation goes through the same three steps: encode the route,
//! register a token and cross the boundary, then await the token's
//! completion. Encoding errors surface before anything is registered.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, instrument};

use crate::cluster::route::Route;
use crate::core::command::Cmd;
use crate::core::engine::{WireBatchOptions, WirePayload, WireRequest};
use crate::core::lifecycle::ClientCore;
use crate::core::registry::PendingRequest;
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Shared dispatch path behind every client facade.
#[derive(Debug)]
pub struct Dispatcher {
    core: ClientCore,
}

impl Dispatcher {
    pub(crate) fn new(core: ClientCore) -> Self {
        Self { core }
    }

    /// Submits a single command and returns its pending result.
    ///
    /// # Errors
    ///
    /// Encoding, closing and dispatch errors, all before any completion.
    #[instrument(skip(self, cmd), fields(request = cmd.request_type().name()), level = "debug")]
    pub fn submit(&self, cmd: &Cmd, route: Option<&Route>) -> Result<PendingRequest> {
        let route = Route::encode(route)?;
        let pending = self.core.submit(WireRequest {
            payload: WirePayload::Command(cmd),
            route: route.as_deref(),
        })?;
        debug!(token = %pending.token(), "submitted");
        Ok(pending)
    }

    /// Submits an ordered group of commands completed by one callback.
    #[instrument(skip(self, commands, options), fields(len = commands.len()), level = "debug")]
    pub(crate) fn submit_batch(
        &self,
        commands: &[Cmd],
        atomic: bool,
        options: WireBatchOptions,
        route: Option<&Route>,
    ) -> Result<PendingRequest> {
        let route = Route::encode(route)?;
        let pending = self.core.submit(WireRequest {
            payload: WirePayload::Batch {
                commands,
                atomic,
                options,
            },
            route: route.as_deref(),
        })?;
        debug!(token = %pending.token(), atomic, "batch submitted");
        Ok(pending)
    }

    /// Submits a request that is neither a command nor a batch, with
    /// engine-chosen routing.
    pub(crate) fn submit_payload(&self, payload: WirePayload<'_>) -> Result<PendingRequest> {
        let pending = self.core.submit(WireRequest {
            payload,
            route: None,
        })?;
        debug!(token = %pending.token(), "submitted");
        Ok(pending)
    }

    pub(crate) fn pin_scan_cursor(&self, cursor: String) -> u64 {
        self.core.pin_scan_cursor(cursor)
    }

    pub(crate) fn release_scan_cursor(&self, handle: u64) {
        self.core.release_scan_cursor(handle);
    }

    /// Number of scan cursors handed out and not yet released.
    pub fn scan_cursors(&self) -> usize {
        self.core.scan_cursors()
    }

    /// Sends a command and waits for its reply.
    ///
    /// A `Frame::Error` reply is returned as a value; callers that want it as
    /// an error use [`parse_frame_response`](crate::command::parse_frame_response).
    pub async fn send_command(&self, cmd: &Cmd, route: Option<&Route>) -> Result<Frame> {
        self.submit(cmd, route)?.await
    }

    /// Submits every command before awaiting any of them.
    ///
    /// Results are in input order. A command that fails to submit does not
    /// stop the others.
    pub async fn send_all(&self, cmds: &[Cmd], route: Option<&Route>) -> Vec<Result<Frame>> {
        let submitted: Vec<_> = cmds.iter().map(|cmd| self.submit(cmd, route)).collect();
        join_all(submitted.into_iter().map(|pending| async move { pending?.await })).await
    }

    /// Sends a command and waits at most `timeout` for its reply.
    ///
    /// On expiry the request is abandoned: its token is removed and a later
    /// completion is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the deadline passes first.
    pub async fn send_command_timeout(
        &self,
        cmd: &Cmd,
        route: Option<&Route>,
        timeout: Duration,
    ) -> Result<Frame> {
        let pending = self.submit(cmd, route)?;
        let token = pending.token();
        match tokio::time::timeout(timeout, pending).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%token, ?timeout, "request abandoned after deadline");
                Err(Error::Timeout {
                    message: format!("no reply within {timeout:?}"),
                })
            }
        }
    }

    /// Closes the underlying client. See [`ClientCore::close`].
    pub fn close(&self) {
        self.core.close();
    }

    /// Returns `true` once the client is closed.
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Number of requests awaiting a completion.
    pub fn pending_requests(&self) -> usize {
        self.core.pending_requests()
    }
}
