//! Cluster scan and connection password updates.
//!
//! Neither is a plain command: a cluster scan step carries an engine-side
//! cursor id, and a password update reconfigures the engine's connections.
//! Both still complete through the token path like any command.
//!
//! A [`ScanCursor`] returned by a scan step is pinned in the client until it
//! is dropped, which frees the engine's scan state for it.

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::instrument;

use crate::core::command::{parse_frame_response, parse_ok};
use crate::core::dispatch::Dispatcher;
use crate::core::engine::WirePayload;
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Cursor id the engine returns once every node has been scanned.
pub const FINISHED_SCAN_CURSOR: &str = "finished";

const INITIAL_SCAN_CURSOR: &str = "0";

/// Key type filter for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// String keys.
    String,
    /// List keys.
    List,
    /// Set keys.
    Set,
    /// Sorted set keys.
    ZSet,
    /// Hash keys.
    Hash,
    /// Stream keys.
    Stream,
}

impl ObjectType {
    fn as_str(self) -> &'static str {
        match self {
            ObjectType::String => "string",
            ObjectType::List => "list",
            ObjectType::Set => "set",
            ObjectType::ZSet => "zset",
            ObjectType::Hash => "hash",
            ObjectType::Stream => "stream",
        }
    }
}

/// Options for one cluster scan step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterScanOptions {
    match_pattern: Option<Bytes>,
    count: Option<u32>,
    object_type: Option<ObjectType>,
}

impl ClusterScanOptions {
    /// No filter, engine-default count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only return keys matching a glob-style pattern.
    #[inline]
    pub fn match_pattern(mut self, pattern: impl Into<Bytes>) -> Self {
        self.match_pattern = Some(pattern.into());
        self
    }

    /// Hint for how many keys each node returns per step.
    #[inline]
    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Only return keys of one type.
    #[inline]
    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    /// The options as `MATCH`/`COUNT`/`TYPE` argument pairs.
    pub fn to_args(&self) -> Vec<Bytes> {
        let mut args = Vec::new();
        if let Some(pattern) = &self.match_pattern {
            args.push(Bytes::from_static(b"MATCH"));
            args.push(pattern.clone());
        }
        if let Some(count) = self.count {
            args.push(Bytes::from_static(b"COUNT"));
            args.push(Bytes::from(count.to_string()));
        }
        if let Some(object_type) = self.object_type {
            args.push(Bytes::from_static(b"TYPE"));
            args.push(Bytes::from_static(object_type.as_str().as_bytes()));
        }
        args
    }
}

/// Position of a cluster scan.
///
/// [`ScanCursor::new`] starts a scan. Each step returns the cursor for the
/// next one; a cursor obtained that way holds engine-side state that is freed
/// when the cursor is dropped, or when the client is closed.
pub struct ScanCursor {
    id: String,
    pin: Option<(u64, Weak<Dispatcher>)>,
}

impl ScanCursor {
    /// A cursor that starts a new scan.
    pub fn new() -> Self {
        Self {
            id: INITIAL_SCAN_CURSOR.to_string(),
            pin: None,
        }
    }

    fn pinned(id: String, dispatcher: &Arc<Dispatcher>) -> Self {
        if id == FINISHED_SCAN_CURSOR {
            return Self { id, pin: None };
        }
        let handle = dispatcher.pin_scan_cursor(id.clone());
        Self {
            id,
            pin: Some((handle, Arc::downgrade(dispatcher))),
        }
    }

    /// The engine's id for this position.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` once the scan has covered every node.
    pub fn is_finished(&self) -> bool {
        self.id == FINISHED_SCAN_CURSOR
    }
}

impl Default for ScanCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScanCursor {
    fn drop(&mut self) {
        if let Some((handle, dispatcher)) = self.pin.take() {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.release_scan_cursor(handle);
            }
        }
    }
}

impl fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCursor")
            .field("id", &self.id)
            .field("pinned", &self.pin.is_some())
            .finish()
    }
}

impl Dispatcher {
    /// Runs one cluster scan step from `cursor`.
    ///
    /// Returns the cursor for the next step and the keys found in this one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `cursor` is already finished; the
    ///   engine is not called.
    /// - [`Error::Protocol`] if the reply is not `[cursor, [keys...]]`.
    /// - Any error of a single command submission.
    #[instrument(skip(self, cursor, options), fields(cursor = cursor.id()), level = "debug")]
    pub async fn cluster_scan(
        self: &Arc<Self>,
        cursor: &ScanCursor,
        options: &ClusterScanOptions,
    ) -> Result<(ScanCursor, Vec<Bytes>)> {
        if cursor.is_finished() {
            return Err(Error::InvalidArgument {
                message: "scan cursor is already finished".to_string(),
            });
        }
        let args = options.to_args();
        let pending = self.submit_payload(WirePayload::ClusterScan {
            cursor: cursor.id(),
            args: &args,
        })?;
        let (next, keys) = decode_scan_reply(pending.await?)?;
        Ok((ScanCursor::pinned(next, self), keys))
    }

    /// Replaces the password the engine authenticates with.
    ///
    /// `None` or an empty password removes it. With `immediate_auth` the
    /// engine re-authenticates its open connections before replying.
    #[instrument(skip(self, password), level = "debug")]
    pub async fn update_connection_password(
        &self,
        password: Option<&str>,
        immediate_auth: bool,
    ) -> Result<()> {
        let pending = self.submit_payload(WirePayload::UpdatePassword {
            password: password.filter(|p| !p.is_empty()),
            immediate_auth,
        })?;
        parse_ok(pending.await?)
    }
}

fn decode_scan_reply(reply: Frame) -> Result<(String, Vec<Bytes>)> {
    let unexpected = |what: String| Error::Protocol {
        message: format!("unexpected scan reply: {what}"),
    };

    let items = match parse_frame_response(reply)? {
        Frame::Array(items) => items,
        other => return Err(unexpected(format!("{other:?}"))),
    };
    let [cursor, keys]: [Frame; 2] = items
        .try_into()
        .map_err(|items: Vec<Frame>| unexpected(format!("{} elements", items.len())))?;

    let cursor = cursor
        .as_bytes()
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .ok_or_else(|| unexpected(format!("cursor {cursor:?}")))?;
    let keys = match keys {
        Frame::Array(keys) | Frame::Set(keys) => keys,
        other => return Err(unexpected(format!("keys {other:?}"))),
    };
    let keys = keys
        .into_iter()
        .map(|key| match key {
            Frame::BulkString(Some(key)) => Ok(key),
            Frame::SimpleString(key) => Ok(Bytes::from(key)),
            other => Err(unexpected(format!("key {other:?}"))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((cursor, keys))
}
