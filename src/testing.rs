//! In-process engine double.
//!
//! [`MockEngine`] is both a [`Connector`] and the [`Engine`] it connects.
//! Clones share state, so a test keeps one clone to inspect submissions and
//! to complete, fail or ignore them from any thread while the client owns
//! another.
//!
//! ```
//! use muxis_bridge::testing::MockEngine;
//! use muxis_bridge::{Client, ClientBuilder, Frame};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> muxis_bridge::Result<()> {
//! let engine = MockEngine::new();
//! engine.respond_with(|_| Some(Ok(Frame::SimpleString(b"PONG".to_vec()))));
//!
//! let client = ClientBuilder::new().address("localhost:6379").connect(&engine)?;
//! assert_eq!(client.ping().await?, "PONG");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::core::command::Cmd;
use crate::core::completion::Completions;
use crate::core::engine::{Connector, Engine, EngineError, WireBatchOptions, WirePayload, WireRequest};
use crate::core::registry::Token;
use crate::proto::codec::encode_frame;
use crate::proto::error::RequestErrorType;
use crate::proto::frame::Frame;

/// A request as the mock engine received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Token the request was submitted with.
    pub token: Token,
    /// The submitted commands; a single command is a one-element list.
    pub commands: Vec<Cmd>,
    /// `Some(atomic)` for batches, `None` for single commands.
    pub atomic: Option<bool>,
    /// Batch options, for batches.
    pub options: Option<WireBatchOptions>,
    /// Encoded route bytes.
    pub route: Option<Bytes>,
    /// Set for requests that carry no commands.
    pub control: Option<Control>,
}

/// A request other than a command or batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// One cluster scan step.
    ClusterScan {
        /// Cursor id the step starts from.
        cursor: String,
        /// `MATCH`/`COUNT`/`TYPE` arguments.
        args: Vec<Bytes>,
    },
    /// A connection password update.
    UpdatePassword {
        /// The new password, `None` to remove it.
        password: Option<String>,
        /// Whether open connections re-authenticate immediately.
        immediate_auth: bool,
    },
}

/// Reply produced by a responder: a value, or a failure message and kind.
pub type Reply = Result<Frame, (String, RequestErrorType)>;

type Responder = dyn Fn(&Submission) -> Option<Reply> + Send + Sync;

#[derive(Default)]
struct State {
    completions: Mutex<Option<Completions>>,
    connection_request: Mutex<Option<Vec<u8>>>,
    submissions: Mutex<Vec<Submission>>,
    released_cursors: Mutex<Vec<String>>,
    responder: Mutex<Option<Arc<Responder>>>,
    threaded: AtomicBool,
    reject_submissions: AtomicBool,
    refuse_connections: AtomicBool,
    close_count: AtomicUsize,
    submitted: Notify,
}

/// Recording engine double. See the [module docs](self).
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<State>,
}

impl MockEngine {
    /// Creates a mock engine that records submissions and never replies on
    /// its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to every submission inline, on the submitting thread.
    /// `None` from `responder` leaves the request pending.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Submission) -> Option<Reply> + Send + Sync + 'static,
    {
        self.state.threaded.store(false, Ordering::Release);
        *lock(&self.state.responder) = Some(Arc::new(responder));
    }

    /// Like [`respond_with`](Self::respond_with), but every reply is
    /// delivered from a freshly spawned OS thread.
    pub fn respond_from_threads<F>(&self, responder: F)
    where
        F: Fn(&Submission) -> Option<Reply> + Send + Sync + 'static,
    {
        self.state.threaded.store(true, Ordering::Release);
        *lock(&self.state.responder) = Some(Arc::new(responder));
    }

    /// Makes `submit` refuse every request.
    pub fn reject_submissions(&self, reject: bool) {
        self.state.reject_submissions.store(reject, Ordering::Release);
    }

    /// Makes `connect` refuse every connection.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse_connections.store(refuse, Ordering::Release);
    }

    /// All submissions so far, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.state.submissions).clone()
    }

    /// The most recent submission.
    pub fn last_submission(&self) -> Option<Submission> {
        lock(&self.state.submissions).last().cloned()
    }

    /// Waits until at least `count` requests have been submitted.
    pub async fn wait_for_submissions(&self, count: usize) {
        loop {
            let notified = self.state.submitted.notified();
            if lock(&self.state.submissions).len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Scan cursor ids released so far, in order.
    pub fn released_scan_cursors(&self) -> Vec<String> {
        lock(&self.state.released_cursors).clone()
    }

    /// The connection request passed to the last `connect`.
    pub fn connection_request(&self) -> Option<Vec<u8>> {
        lock(&self.state.connection_request).clone()
    }

    /// How many times an engine client was closed.
    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::Acquire)
    }

    /// Reports success for `token`, encoding `value` as the engine would.
    pub fn complete(&self, token: Token, value: &Frame) {
        self.complete_raw(token, &encode_frame(value));
    }

    /// Reports success for `token` with a raw payload.
    pub fn complete_raw(&self, token: Token, payload: &[u8]) {
        if let Some(completions) = self.completions() {
            completions.on_complete(token, payload);
        }
    }

    /// Reports failure for `token`.
    pub fn fail(&self, token: Token, message: &str, kind: RequestErrorType) {
        if let Some(completions) = self.completions() {
            completions.on_failure(token, message, kind);
        }
    }

    fn completions(&self) -> Option<Completions> {
        lock(&self.state.completions).clone()
    }

    fn deliver(completions: &Completions, token: Token, reply: Reply) {
        match reply {
            Ok(value) => completions.on_complete(token, &encode_frame(&value)),
            Err((message, kind)) => completions.on_failure(token, &message, kind),
        }
    }
}

impl Connector for MockEngine {
    fn connect(
        &self,
        connection_request: &[u8],
        completions: Completions,
    ) -> Result<Box<dyn Engine>, EngineError> {
        if self.state.refuse_connections.load(Ordering::Acquire) {
            return Err(EngineError::new("connection refused"));
        }
        *lock(&self.state.connection_request) = Some(connection_request.to_vec());
        *lock(&self.state.completions) = Some(completions);
        Ok(Box::new(self.clone()))
    }
}

impl Engine for MockEngine {
    fn submit(&self, request: WireRequest<'_>, token: Token) -> Result<(), EngineError> {
        if self.state.reject_submissions.load(Ordering::Acquire) {
            return Err(EngineError::new("submission rejected"));
        }

        let (commands, atomic, options, control) = match request.payload {
            WirePayload::Command(cmd) => (vec![cmd.clone()], None, None, None),
            WirePayload::Batch {
                commands,
                atomic,
                options,
            } => (commands.to_vec(), Some(atomic), Some(options), None),
            WirePayload::ClusterScan { cursor, args } => {
                let control = Control::ClusterScan {
                    cursor: cursor.to_string(),
                    args: args.to_vec(),
                };
                (Vec::new(), None, None, Some(control))
            }
            WirePayload::UpdatePassword {
                password,
                immediate_auth,
            } => {
                let control = Control::UpdatePassword {
                    password: password.map(str::to_string),
                    immediate_auth,
                };
                (Vec::new(), None, None, Some(control))
            }
        };
        let submission = Submission {
            token,
            commands,
            atomic,
            options,
            route: request.route.map(Bytes::copy_from_slice),
            control,
        };
        lock(&self.state.submissions).push(submission.clone());
        self.state.submitted.notify_waiters();

        let responder = lock(&self.state.responder).clone();
        let (Some(responder), Some(completions)) = (responder, self.completions()) else {
            return Ok(());
        };
        if self.state.threaded.load(Ordering::Acquire) {
            std::thread::spawn(move || {
                if let Some(reply) = responder(&submission) {
                    Self::deliver(&completions, token, reply);
                }
            });
        } else if let Some(reply) = responder(&submission) {
            Self::deliver(&completions, token, reply);
        }
        Ok(())
    }

    fn release_scan_cursor(&self, cursor: &str) {
        lock(&self.state.released_cursors).push(cursor.to_string());
    }

    fn close(&self) {
        self.state.close_count.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEngine")
            .field("submissions", &lock(&self.state.submissions).len())
            .field("close_count", &self.close_count())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
