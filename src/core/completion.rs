//! Completion side of the boundary.
//!
//! The engine reports every accepted request exactly once, from one of its
//! own threads, through a [`Completions`] handle. Reports for tokens that are
//! no longer pending (abandoned, already failed by `close`, or duplicated)
//! are dropped without effect.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::registry::{Registry, Token};
use crate::proto::codec::decode_payload;
use crate::proto::error::RequestErrorType;
use crate::proto::frame::Frame;

/// Handle the engine uses to report results.
///
/// Cheap to clone; every method may be called from any thread, including
/// threads the async runtime knows nothing about. None of them block beyond
/// a short registry lock.
#[derive(Debug, Clone)]
pub struct Completions {
    registry: Arc<Registry>,
}

impl Completions {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Reports success with an encoded reply.
    ///
    /// The payload is decoded here, on the calling thread, only if `token`
    /// is still pending. A payload that fails to decode resolves the request
    /// with [`Error::Protocol`](crate::Error::Protocol).
    pub fn on_complete(&self, token: Token, payload: &[u8]) {
        let resolved = self.registry.resolve_with(token, || {
            decode_payload(payload).inspect_err(|e| {
                debug!(%token, error = %e, "undecodable completion payload");
            })
        });
        if resolved {
            trace!(%token, len = payload.len(), "completed");
        }
    }

    /// Reports success with an already decoded reply.
    pub fn on_value(&self, token: Token, value: Frame) {
        if self.registry.complete(token, value) {
            trace!(%token, "completed");
        }
    }

    /// Reports failure.
    pub fn on_failure(&self, token: Token, message: &str, kind: RequestErrorType) {
        let resolved = self
            .registry
            .resolve_with(token, || Err(kind.into_error(message.to_string())));
        if resolved {
            debug!(%token, ?kind, message, "request failed");
        }
    }

    /// Number of requests still awaiting a report.
    pub fn pending(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::error::Error;

    fn completions() -> (Arc<Registry>, Completions) {
        let registry = Arc::new(Registry::default());
        (Arc::clone(&registry), Completions::new(registry))
    }

    #[tokio::test]
    async fn test_on_complete_decodes_payload() {
        let (registry, completions) = completions();
        let pending = registry.register().unwrap();
        completions.on_complete(pending.token(), b"$5\r\nhello\r\n");
        assert_eq!(pending.await.unwrap(), Frame::from("hello"));
    }

    #[tokio::test]
    async fn test_on_complete_bad_payload() {
        let (registry, completions) = completions();
        let pending = registry.register().unwrap();
        completions.on_complete(pending.token(), b"?garbage");
        assert!(matches!(pending.await, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_on_failure_maps_kind() {
        let (registry, completions) = completions();
        let cases = [
            (RequestErrorType::Unspecified, "ERR x"),
            (RequestErrorType::ExecAbort, "EXECABORT"),
            (RequestErrorType::Timeout, "timed out"),
            (RequestErrorType::Disconnect, "lost"),
        ];
        for (kind, message) in cases {
            let pending = registry.register().unwrap();
            completions.on_failure(pending.token(), message, kind);
            let err = pending.await.unwrap_err();
            match kind {
                RequestErrorType::Unspecified => assert!(matches!(err, Error::Server { .. })),
                RequestErrorType::ExecAbort => assert!(matches!(err, Error::ExecAbort { .. })),
                RequestErrorType::Timeout => assert!(matches!(err, Error::Timeout { .. })),
                RequestErrorType::Disconnect => assert!(matches!(err, Error::Connection { .. })),
            }
            assert!(err.to_string().contains(message));
        }
    }

    #[test]
    fn test_unknown_token_ignored() {
        let (_registry, completions) = completions();
        completions.on_complete(Token::from_raw(7), b"+OK\r\n");
        completions.on_failure(Token::from_raw(7), "late", RequestErrorType::Timeout);
        completions.on_value(Token::from_raw(7), Frame::Null);
        assert_eq!(completions.pending(), 0);
    }

    #[tokio::test]
    async fn test_completion_from_foreign_thread() {
        let (registry, completions) = completions();
        let pending = registry.register().unwrap();
        let token = pending.token();
        std::thread::spawn(move || completions.on_value(token, Frame::Integer(5)))
            .join()
            .unwrap();
        assert_eq!(pending.await.unwrap(), Frame::Integer(5));
    }
}
