//! Engine double for integration tests, built only on the public traits.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use muxis_bridge::proto::codec::encode_frame;
use muxis_bridge::{
    Completions, Connector, Engine, EngineError, Frame, RequestErrorType, RequestType, Token,
    WirePayload, WireRequest,
};

/// A request as the engine saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub token: Token,
    pub commands: Vec<(RequestType, Vec<Bytes>)>,
    pub atomic: Option<bool>,
    pub route: Option<Vec<u8>>,
    /// Cursor id of a cluster scan step.
    pub scan_cursor: Option<String>,
    /// `(password, immediate_auth)` of a password update.
    pub password: Option<(Option<String>, bool)>,
}

pub type Reply = Result<Frame, (&'static str, RequestErrorType)>;

type Responder = dyn Fn(&Seen) -> Option<Reply> + Send + Sync;

#[derive(Default)]
struct Shared {
    completions: Mutex<Option<Completions>>,
    seen: Mutex<Vec<Seen>>,
    released: Mutex<Vec<String>>,
    responder: Mutex<Option<Arc<Responder>>>,
    closed: AtomicUsize,
}

/// Replies from a fresh OS thread per request, or not at all when the
/// responder returns `None`.
#[derive(Clone, Default)]
pub struct ThreadEngine {
    shared: Arc<Shared>,
}

impl ThreadEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echoes the arguments of every command back as an array of bulk
    /// strings. Batches get one such array per command.
    pub fn echo() -> Self {
        let engine = Self::new();
        engine.respond(|seen| {
            let replies: Vec<Frame> = seen
                .commands
                .iter()
                .filter(|(ty, _)| !matches!(ty, RequestType::Multi | RequestType::Exec))
                .map(|(_, args)| echo_args(args))
                .collect();
            match seen.atomic {
                Some(_) => Some(Ok(Frame::Array(replies))),
                None => replies.into_iter().next().map(Ok),
            }
        });
        engine
    }

    pub fn respond<F>(&self, f: F)
    where
        F: Fn(&Seen) -> Option<Reply> + Send + Sync + 'static,
    {
        *self.shared.responder.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.shared.seen.lock().unwrap().clone()
    }

    pub fn released_cursors(&self) -> Vec<String> {
        self.shared.released.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Completes `token` as if the engine reported it late.
    pub fn complete(&self, token: Token, frame: &Frame) {
        if let Some(completions) = self.shared.completions.lock().unwrap().clone() {
            completions.on_complete(token, &encode_frame(frame));
        }
    }

    pub fn fail(&self, token: Token, message: &str, kind: RequestErrorType) {
        if let Some(completions) = self.shared.completions.lock().unwrap().clone() {
            completions.on_failure(token, message, kind);
        }
    }
}

pub fn echo_args(args: &[Bytes]) -> Frame {
    Frame::Array(
        args.iter()
            .map(|arg| Frame::BulkString(Some(arg.clone())))
            .collect(),
    )
}

impl Connector for ThreadEngine {
    fn connect(
        &self,
        _connection_request: &[u8],
        completions: Completions,
    ) -> Result<Box<dyn Engine>, EngineError> {
        *self.shared.completions.lock().unwrap() = Some(completions);
        Ok(Box::new(self.clone()))
    }
}

impl Engine for ThreadEngine {
    fn submit(&self, request: WireRequest<'_>, token: Token) -> Result<(), EngineError> {
        let mut scan_cursor = None;
        let mut password = None;
        let (commands, atomic) = match request.payload {
            WirePayload::Command(cmd) => (vec![cmd.clone()], None),
            WirePayload::Batch {
                commands, atomic, ..
            } => (commands.to_vec(), Some(atomic)),
            WirePayload::ClusterScan { cursor, .. } => {
                scan_cursor = Some(cursor.to_string());
                (Vec::new(), None)
            }
            WirePayload::UpdatePassword {
                password: new,
                immediate_auth,
            } => {
                password = Some((new.map(str::to_string), immediate_auth));
                (Vec::new(), None)
            }
        };
        let seen = Seen {
            token,
            commands: commands
                .iter()
                .map(|cmd| (cmd.request_type(), cmd.args().to_vec()))
                .collect(),
            atomic,
            route: request.route.map(<[u8]>::to_vec),
            scan_cursor,
            password,
        };
        self.shared.seen.lock().unwrap().push(seen.clone());

        let responder = self.shared.responder.lock().unwrap().clone();
        let Some(responder) = responder else {
            return Ok(());
        };
        let completions = self.shared.completions.lock().unwrap().clone();
        std::thread::spawn(move || {
            let Some(completions) = completions else {
                return;
            };
            match responder(&seen) {
                Some(Ok(frame)) => completions.on_complete(token, &encode_frame(&frame)),
                Some(Err((message, kind))) => completions.on_failure(token, message, kind),
                None => {}
            }
        });
        Ok(())
    }

    fn release_scan_cursor(&self, cursor: &str) {
        self.shared.released.lock().unwrap().push(cursor.to_string());
    }

    fn close(&self) {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}
