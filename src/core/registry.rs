//! Pending request registry.
//!
//! Every request handed to the engine is registered here first and gets a
//! [`Token`]. The engine echoes the token back through the completion
//! callback, which removes the entry and resolves the waiting caller.
//!
//! Entries live in a fixed number of shards so callback threads and
//! submitting tasks rarely contend on the same lock. Removal is always
//! "take": whoever removes an entry owns the right to resolve it, so each
//! request is resolved at most once no matter how completions, timeouts and
//! `close` interleave.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

const SHARDS: usize = 32;

/// Default cap on concurrently pending requests per client.
pub const DEFAULT_MAX_INFLIGHT: usize = 1000;

type Slot = oneshot::Sender<Result<Frame>>;

/// Correlates a pending request with its completion.
///
/// Tokens are unique for the lifetime of a registry and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Rebuilds a token from the raw value the engine echoed back.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Token(raw)
    }

    /// The raw value passed across the boundary.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    fn shard(self) -> usize {
        (self.0 % SHARDS as u64) as usize
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Map from token to the sender that resolves the waiting caller.
pub struct Registry {
    shards: Box<[Mutex<HashMap<u64, Slot>>]>,
    next_token: AtomicU64,
    pending: AtomicUsize,
    max_inflight: usize,
}

impl Registry {
    /// Creates a registry that admits at most `max_inflight` pending requests.
    /// Zero means unlimited.
    pub fn new(max_inflight: usize) -> Self {
        let shards = (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            next_token: AtomicU64::new(1),
            pending: AtomicUsize::new(0),
            max_inflight,
        }
    }

    /// Registers a new pending request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] if the in-flight limit is reached.
    pub fn register(self: &Arc<Self>) -> Result<PendingRequest> {
        let pending = self.pending.fetch_add(1, Ordering::AcqRel);
        if self.max_inflight != 0 && pending >= self.max_inflight {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            debug!(limit = self.max_inflight, "in-flight limit reached");
            return Err(Error::Dispatch {
                message: "client reached maximum inflight requests".to_string(),
            });
        }

        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.shard(token).insert(token.0, tx);
        trace!(%token, "registered");

        Ok(PendingRequest {
            token,
            rx,
            registry: Arc::clone(self),
        })
    }

    /// Resolves `token` with a value. Returns `false` if it was not pending.
    pub fn complete(&self, token: Token, frame: Frame) -> bool {
        self.resolve(token, Ok(frame))
    }

    /// Resolves `token` with an error. Returns `false` if it was not pending.
    pub fn fail(&self, token: Token, error: Error) -> bool {
        self.resolve(token, Err(error))
    }

    /// Resolves `token` with `result`.
    ///
    /// A caller that stopped waiting is not an error: the entry is simply
    /// gone once this returns.
    pub fn resolve(&self, token: Token, result: Result<Frame>) -> bool {
        self.resolve_with(token, || result)
    }

    /// Like [`resolve`](Self::resolve), but only builds the result once the
    /// entry has been taken. Unknown tokens never pay for `make_result`.
    pub fn resolve_with<F>(&self, token: Token, make_result: F) -> bool
    where
        F: FnOnce() -> Result<Frame>,
    {
        match self.take(token) {
            Some(tx) => {
                let _ = tx.send(make_result());
                true
            }
            None => {
                debug!(%token, "completion for unknown token ignored");
                false
            }
        }
    }

    /// Removes `token` without resolving it.
    pub fn remove(&self, token: Token) -> bool {
        self.take(token).is_some()
    }

    /// Returns `true` if `token` is still pending.
    pub fn contains(&self, token: Token) -> bool {
        self.shard(token).contains_key(&token.0)
    }

    /// Fails every pending request with an error built by `make_error`.
    ///
    /// Returns how many requests were failed.
    pub fn drain<F>(&self, make_error: F) -> usize
    where
        F: Fn() -> Error,
    {
        let mut drained = 0;
        for shard in self.shards.iter() {
            let entries: Vec<Slot> = {
                let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
                map.drain().map(|(_, tx)| tx).collect()
            };
            self.pending.fetch_sub(entries.len(), Ordering::AcqRel);
            for tx in entries {
                let _ = tx.send(Err(make_error()));
                drained += 1;
            }
        }
        drained
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, token: Token) -> Option<Slot> {
        let tx = self.shard(token).remove(&token.0);
        if tx.is_some() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        tx
    }

    fn shard(&self, token: Token) -> MutexGuard<'_, HashMap<u64, Slot>> {
        self.shards[token.shard()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INFLIGHT)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("pending", &self.len())
            .field("max_inflight", &self.max_inflight)
            .finish()
    }
}

/// A registered request waiting for its completion.
///
/// Resolves to the request's result when awaited. Dropping it before the
/// completion arrives removes the registry entry, so a late completion for
/// an abandoned request is ignored.
#[must_use = "a pending request does nothing unless awaited"]
pub struct PendingRequest {
    token: Token,
    rx: oneshot::Receiver<Result<Frame>>,
    registry: Arc<Registry>,
}

impl PendingRequest {
    /// The token the engine must echo back.
    #[inline]
    pub fn token(&self) -> Token {
        self.token
    }
}

impl Future for PendingRequest {
    type Output = Result<Frame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(Error::closing("request dropped before completion")))
        })
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.registry.remove(self.token) {
            trace!(token = %self.token, "abandoned");
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_resolves_waiter() {
        let registry = Arc::new(Registry::default());
        let pending = registry.register().unwrap();
        assert!(registry.complete(pending.token(), Frame::Integer(1)));
        assert_eq!(pending.await.unwrap(), Frame::Integer(1));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_fail_resolves_waiter() {
        let registry = Arc::new(Registry::default());
        let pending = registry.register().unwrap();
        registry.fail(
            pending.token(),
            Error::Server {
                message: "ERR".to_string(),
            },
        );
        assert!(matches!(pending.await, Err(Error::Server { .. })));
    }

    #[test]
    fn test_tokens_unique_and_nonzero() {
        let registry = Arc::new(Registry::new(0));
        let a = registry.register().unwrap();
        let b = registry.register().unwrap();
        assert_ne!(a.token(), b.token());
        assert_ne!(a.token().as_raw(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_second_completion_is_noop() {
        let registry = Arc::new(Registry::default());
        let pending = registry.register().unwrap();
        let token = pending.token();
        assert!(registry.complete(token, Frame::Null));
        assert!(!registry.complete(token, Frame::Null));
        assert!(!registry.fail(token, Error::closing("x")));
    }

    #[test]
    fn test_unknown_token_is_noop() {
        let registry = Registry::default();
        assert!(!registry.complete(Token::from_raw(42), Frame::Null));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_removes_entry() {
        let registry = Arc::new(Registry::default());
        let pending = registry.register().unwrap();
        let token = pending.token();
        drop(pending);
        assert!(!registry.contains(token));
        assert!(registry.is_empty());
        assert!(!registry.complete(token, Frame::Null));
    }

    #[tokio::test]
    async fn test_drain_fails_everything() {
        let registry = Arc::new(Registry::default());
        let first = registry.register().unwrap();
        let second = registry.register().unwrap();

        assert_eq!(registry.drain(|| Error::closing("closed")), 2);
        assert!(registry.is_empty());
        assert!(first.await.unwrap_err().is_closing());
        assert!(second.await.unwrap_err().is_closing());
    }

    #[test]
    fn test_inflight_limit() {
        let registry = Arc::new(Registry::new(2));
        let _a = registry.register().unwrap();
        let b = registry.register().unwrap();
        let err = registry.register().unwrap_err();
        assert!(matches!(err, Error::Dispatch { ref message } if message.contains("maximum inflight")));

        drop(b);
        assert!(registry.register().is_ok());
    }

    #[test]
    fn test_concurrent_register_and_complete() {
        let registry = Arc::new(Registry::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let pending = registry.register().unwrap();
                        assert!(registry.complete(pending.token(), Frame::Null));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
