//! Client lifecycle: one engine handle, one registry, one closed flag.
//!
//! Submissions hold a shared lock on the engine slot for the whole
//! register-and-cross sequence; `close` takes the exclusive lock to remove
//! the engine. Once `close` holds the lock no new token can be registered,
//! so draining the registry afterwards reaches every request that will ever
//! be waiting.
//!
//! Scan cursors handed out to callers are pinned in a [`HandleTable`]. A
//! cursor released before close frees its engine-side state; close forgets
//! them all, since closing the engine frees that state wholesale.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, trace};

use crate::core::completion::Completions;
use crate::core::engine::{Connector, Engine, WireRequest};
use crate::core::handles::HandleTable;
use crate::core::registry::{PendingRequest, Registry};
use crate::proto::error::{Error, Result};

/// Owns the engine handle and the pending request registry of one client.
pub struct ClientCore {
    engine: RwLock<Option<Box<dyn Engine>>>,
    closed: AtomicBool,
    registry: Arc<Registry>,
    cursors: Mutex<HandleTable<String>>,
}

impl ClientCore {
    /// Connects an engine client and wires its completions to a fresh
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the engine refuses the connection.
    pub fn open<C>(connector: &C, connection_request: &[u8], max_inflight: usize) -> Result<Self>
    where
        C: Connector + ?Sized,
    {
        let registry = Arc::new(Registry::new(max_inflight));
        let completions = Completions::new(Arc::clone(&registry));
        let engine = connector
            .connect(connection_request, completions)
            .map_err(|e| Error::Connection {
                message: e.to_string(),
            })?;
        info!(max_inflight, "engine client created");

        Ok(Self {
            engine: RwLock::new(Some(engine)),
            closed: AtomicBool::new(false),
            registry,
            cursors: Mutex::new(HandleTable::new()),
        })
    }

    /// Registers a token and hands `request` to the engine.
    ///
    /// # Errors
    ///
    /// - [`Error::Closing`] if the client is closed; the engine is not called.
    /// - [`Error::Dispatch`] if the in-flight limit is reached or the engine
    ///   refuses the request. No token stays registered.
    pub fn submit(&self, request: WireRequest<'_>) -> Result<PendingRequest> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closing("client is closed"));
        }

        let slot = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        let engine = slot
            .as_deref()
            .ok_or_else(|| Error::closing("client is closed"))?;

        let pending = self.registry.register()?;
        engine
            .submit(request, pending.token())
            .map_err(|e| Error::Dispatch {
                message: e.to_string(),
            })?;
        Ok(pending)
    }

    /// Closes the client.
    ///
    /// Marks the client closed, fails every pending request with
    /// [`Error::Closing`] and releases the engine handle. Only the first call
    /// does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let engine = self
            .engine
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let failed = self
            .registry
            .drain(|| Error::closing("client closed while the request was pending"));
        let cursors = self.lock_cursors().clear().len();
        if let Some(engine) = engine {
            engine.close();
        }
        debug!(failed, cursors, "client closed");
    }

    /// Pins an engine scan cursor id and returns the caller's handle to it.
    pub fn pin_scan_cursor(&self, cursor: String) -> u64 {
        self.lock_cursors().insert(cursor)
    }

    /// Releases a pinned scan cursor, freeing its engine-side state.
    ///
    /// Stale handles, including every handle after close, are ignored.
    pub fn release_scan_cursor(&self, handle: u64) {
        let Some(cursor) = self.lock_cursors().remove(handle) else {
            return;
        };
        let slot = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = slot.as_deref() {
            trace!(cursor = %cursor, "scan cursor released");
            engine.release_scan_cursor(&cursor);
        }
    }

    /// Number of pinned scan cursors.
    pub fn scan_cursors(&self) -> usize {
        self.lock_cursors().len()
    }

    fn lock_cursors(&self) -> std::sync::MutexGuard<'_, HandleTable<String>> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once [`close`](Self::close) has started.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests awaiting a completion.
    pub fn pending_requests(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCore")
            .field("closed", &self.is_closed())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command;
    use crate::core::engine::WirePayload;
    use crate::proto::frame::Frame;
    use crate::testing::MockEngine;

    fn request(cmd: &command::Cmd) -> WireRequest<'_> {
        WireRequest {
            payload: WirePayload::Command(cmd),
            route: None,
        }
    }

    #[test]
    fn test_open_passes_connection_request() {
        let engine = MockEngine::new();
        let _core = ClientCore::open(&engine, b"{\"cfg\":1}", 10).unwrap();
        assert_eq!(engine.connection_request().as_deref(), Some(&b"{\"cfg\":1}"[..]));
    }

    #[test]
    fn test_open_refused() {
        let engine = MockEngine::new();
        engine.refuse_connections(true);
        let err = ClientCore::open(&engine, b"", 10).unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[tokio::test]
    async fn test_submit_and_complete() {
        let engine = MockEngine::new();
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        let cmd = command::ping();

        let pending = core.submit(request(&cmd)).unwrap();
        assert_eq!(core.pending_requests(), 1);
        engine.complete(pending.token(), &Frame::SimpleString(b"PONG".to_vec()));

        assert_eq!(pending.await.unwrap(), Frame::SimpleString(b"PONG".to_vec()));
        assert_eq!(core.pending_requests(), 0);
    }

    #[test]
    fn test_engine_refusal_removes_token() {
        let engine = MockEngine::new();
        engine.reject_submissions(true);
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        let cmd = command::ping();

        let err = core.submit(request(&cmd)).unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
        assert_eq!(core.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_rejects_new() {
        let engine = MockEngine::new();
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        let cmd = command::ping();
        let pending = core.submit(request(&cmd)).unwrap();
        let token = pending.token();

        core.close();
        assert!(core.is_closed());
        assert!(pending.await.unwrap_err().is_closing());
        assert!(core.submit(request(&cmd)).unwrap_err().is_closing());
        assert_eq!(engine.submissions().len(), 1);

        // late completion after close
        engine.complete(token, &Frame::Null);
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = MockEngine::new();
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        core.close();
        core.close();
        drop(core);
        assert_eq!(engine.close_count(), 1);
    }

    #[test]
    fn test_scan_cursor_released_once() {
        let engine = MockEngine::new();
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        let handle = core.pin_scan_cursor("cursor-1".to_string());
        assert_eq!(core.scan_cursors(), 1);

        core.release_scan_cursor(handle);
        core.release_scan_cursor(handle);
        assert_eq!(core.scan_cursors(), 0);
        assert_eq!(engine.released_scan_cursors(), vec!["cursor-1".to_string()]);
    }

    #[test]
    fn test_close_forgets_scan_cursors() {
        let engine = MockEngine::new();
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        let handle = core.pin_scan_cursor("cursor-1".to_string());

        core.close();
        core.release_scan_cursor(handle);
        assert_eq!(core.scan_cursors(), 0);
        assert!(engine.released_scan_cursors().is_empty());
    }

    #[test]
    fn test_drop_closes() {
        let engine = MockEngine::new();
        let core = ClientCore::open(&engine, b"", 10).unwrap();
        drop(core);
        assert_eq!(engine.close_count(), 1);
    }
}
