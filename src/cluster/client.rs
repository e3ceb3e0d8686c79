//! Cluster client facade.
//!
//! Same dispatch path as the standalone [`Client`](crate::Client), plus
//! explicit routing. Topology, redirects and slot ownership belong to the
//! engine; this client only states where a command should go.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::cluster::route::Route;
use crate::core::batch::{Batch, BatchOptions};
use crate::core::command::{self, Cmd};
use crate::core::config::ClientConfig;
use crate::core::dispatch::Dispatcher;
use crate::core::engine::Connector;
use crate::core::lifecycle::ClientCore;
use crate::core::scan::{ClusterScanOptions, ScanCursor};
use crate::core::{Error, Result};
use crate::proto::frame::Frame;

/// Reply to a routed command.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterValue {
    /// Reply from one node, or an aggregate the engine already combined.
    Single(Frame),
    /// One reply per node, keyed by node address, in the engine's order.
    Multi(Vec<(String, Frame)>),
}

impl ClusterValue {
    /// Interprets `frame` as the reply to a command sent along `route`.
    ///
    /// Multi-node routes answered with a map become [`ClusterValue::Multi`];
    /// everything else is [`ClusterValue::Single`].
    pub fn from_reply(frame: Frame, route: &Route) -> Result<Self> {
        match frame {
            Frame::Map(entries) if route.is_multi_node() => entries
                .into_iter()
                .map(|(node, value)| {
                    let node = node.as_bytes().ok_or_else(|| Error::Protocol {
                        message: format!("unexpected node key in multi-node reply: {node:?}"),
                    })?;
                    Ok((String::from_utf8_lossy(node).into_owned(), value))
                })
                .collect::<Result<Vec<_>>>()
                .map(ClusterValue::Multi),
            frame => Ok(ClusterValue::Single(frame)),
        }
    }

    /// The single reply, if this is one.
    pub fn into_single(self) -> Option<Frame> {
        match self {
            ClusterValue::Single(frame) => Some(frame),
            ClusterValue::Multi(_) => None,
        }
    }

    /// Per-node replies, if this is a multi-node reply.
    pub fn into_multi(self) -> Option<Vec<(String, Frame)>> {
        match self {
            ClusterValue::Multi(replies) => Some(replies),
            ClusterValue::Single(_) => None,
        }
    }
}

/// Client for a cluster.
///
/// Cheap to clone; clones share one engine client.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    dispatcher: Arc<Dispatcher>,
}

impl ClusterClient {
    /// Opens a cluster client through `connector`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the configuration cannot be serialized,
    /// [`Error::Connection`] if the engine refuses it.
    pub fn open<C>(config: &ClientConfig, connector: &C) -> Result<Self>
    where
        C: Connector + ?Sized,
    {
        let config = config.clone().with_cluster_mode(true);
        let core = ClientCore::open(
            connector,
            &config.to_connection_request()?,
            config.max_inflight_requests(),
        )?;
        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(core)),
        })
    }

    /// The dispatch path this client submits through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Sends a command with engine-chosen routing.
    pub async fn send_command(&self, cmd: &Cmd) -> Result<Frame> {
        self.dispatcher.send_command(cmd, None).await
    }

    /// Sends a command along `route`.
    pub async fn send_command_with_route(&self, cmd: &Cmd, route: &Route) -> Result<ClusterValue> {
        let frame = self.dispatcher.send_command(cmd, Some(route)).await?;
        ClusterValue::from_reply(frame, route)
    }

    /// Like [`send_command_with_route`](Self::send_command_with_route),
    /// abandoning the request after `timeout`.
    pub async fn send_command_with_route_timeout(
        &self,
        cmd: &Cmd,
        route: &Route,
        timeout: Duration,
    ) -> Result<ClusterValue> {
        let frame = self
            .dispatcher
            .send_command_timeout(cmd, Some(route), timeout)
            .await?;
        ClusterValue::from_reply(frame, route)
    }

    /// Sends independent commands concurrently; results are in input order.
    pub async fn send_all(&self, cmds: &[Cmd]) -> Vec<Result<Frame>> {
        self.dispatcher.send_all(cmds, None).await
    }

    /// Sends a command given as its full argument list, with engine-chosen
    /// routing.
    pub async fn custom_command<I, A>(&self, args: I) -> Result<Frame>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let frame = self.send_command(&command::custom(args)).await?;
        command::parse_frame_response(frame)
    }

    /// Sends a command given as its full argument list along `route`.
    pub async fn custom_command_with_route<I, A>(&self, args: I, route: &Route) -> Result<ClusterValue>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let frame = self
            .dispatcher
            .send_command(&command::custom(args), Some(route))
            .await?;
        ClusterValue::from_reply(command::parse_frame_response(frame)?, route)
    }

    /// Sends a PING to a random node.
    pub async fn ping(&self) -> Result<Bytes> {
        let frame = self.send_command(&command::ping()).await?;
        Ok(command::frame_to_bytes(frame)?.unwrap_or_default())
    }

    /// Sends a PING along `route`.
    pub async fn ping_with_route(&self, route: &Route) -> Result<ClusterValue> {
        self.send_command_with_route(&command::ping(), route).await
    }

    /// Gets the value of a key; the engine routes by key.
    pub async fn get(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>> {
        let frame = self.send_command(&command::get(key)).await?;
        command::frame_to_bytes(frame)
    }

    /// Sets the string value of a key.
    pub async fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let frame = self.send_command(&command::set(key, value)).await?;
        command::parse_ok(frame)
    }

    /// Removes a key. Returns `true` if it existed.
    pub async fn del(&self, key: impl Into<Bytes>) -> Result<bool> {
        let frame = self.send_command(&command::del(key)).await?;
        Ok(command::frame_to_int(frame)? > 0)
    }

    /// Executes a batch with default options.
    pub async fn exec(&self, batch: &mut Batch) -> Result<Option<Vec<Frame>>> {
        self.exec_with_options(batch, &BatchOptions::default()).await
    }

    /// Executes a batch, optionally pinned to one node by
    /// [`BatchOptions::route`].
    pub async fn exec_with_options(
        &self,
        batch: &mut Batch,
        options: &BatchOptions,
    ) -> Result<Option<Vec<Frame>>> {
        self.dispatcher.execute(batch, options).await
    }

    /// Runs one step of a cluster-wide key scan.
    ///
    /// Start from [`ScanCursor::new`] and feed each returned cursor into the
    /// next call until [`ScanCursor::is_finished`].
    pub async fn scan(&self, cursor: &ScanCursor) -> Result<(ScanCursor, Vec<Bytes>)> {
        self.scan_with_options(cursor, &ClusterScanOptions::default())
            .await
    }

    /// Like [`scan`](Self::scan), filtered by `options`.
    pub async fn scan_with_options(
        &self,
        cursor: &ScanCursor,
        options: &ClusterScanOptions,
    ) -> Result<(ScanCursor, Vec<Bytes>)> {
        self.dispatcher.cluster_scan(cursor, options).await
    }

    /// Replaces the password the engine authenticates with. An empty
    /// password removes it.
    pub async fn update_connection_password(
        &self,
        password: &str,
        immediate_auth: bool,
    ) -> Result<()> {
        self.dispatcher
            .update_connection_password(Some(password), immediate_auth)
            .await
    }

    /// Removes the password the engine authenticates with.
    pub async fn reset_connection_password(&self, immediate_auth: bool) -> Result<()> {
        self.dispatcher
            .update_connection_password(None, immediate_auth)
            .await
    }

    /// Closes the client for every clone. Idempotent.
    pub fn close(&self) {
        self.dispatcher.close();
    }

    /// Returns `true` once the client is closed.
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Number of requests awaiting a completion.
    pub fn pending_requests(&self) -> usize {
        self.dispatcher.pending_requests()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::route::{SingleNodeRoute, SlotType};
    use crate::core::builder::ClientBuilder;
    use crate::testing::{Control, MockEngine};

    fn client(engine: &MockEngine) -> ClusterClient {
        ClientBuilder::new()
            .address("node-1:7000")
            .address("node-2:7001")
            .connect_cluster(engine)
            .unwrap()
    }

    fn pong() -> Frame {
        Frame::SimpleString(b"PONG".to_vec())
    }

    #[test]
    fn test_open_enables_cluster_mode() {
        let engine = MockEngine::new();
        let _client = client(&engine);
        let value: serde_json::Value =
            serde_json::from_slice(&engine.connection_request().unwrap()).unwrap();
        assert_eq!(value["cluster_mode_enabled"], true);
        assert_eq!(value["addresses"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_multi_node_reply() {
        let engine = MockEngine::new();
        engine.respond_with(|_| {
            Some(Ok(Frame::Map(vec![
                (Frame::from("node-1:7000"), pong()),
                (Frame::from("node-2:7001"), pong()),
            ])))
        });
        let client = client(&engine);

        let reply = client.ping_with_route(&Route::AllPrimaries).await.unwrap();
        let replies = reply.into_multi().unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], ("node-1:7000".to_string(), pong()));
        assert_eq!(&engine.last_submission().unwrap().route.unwrap()[..], &[1]);
    }

    #[tokio::test]
    async fn test_single_node_reply() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(pong())));
        let client = client(&engine);
        let route = Route::by_address("node-2:7001").unwrap();

        let reply = client.ping_with_route(&route).await.unwrap();
        assert_eq!(reply, ClusterValue::Single(pong()));
    }

    #[tokio::test]
    async fn test_custom_command_with_route() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(Frame::Integer(42))));
        let client = client(&engine);
        let route = Route::SlotId {
            slot_type: SlotType::Replica,
            slot_id: 100,
        };

        let reply = client
            .custom_command_with_route(["DBSIZE"], &route)
            .await
            .unwrap();
        assert_eq!(reply.into_single(), Some(Frame::Integer(42)));
        assert_eq!(
            Route::decode(&engine.last_submission().unwrap().route.unwrap()).unwrap(),
            route
        );
    }

    #[tokio::test]
    async fn test_invalid_route_never_submitted() {
        let engine = MockEngine::new();
        let client = client(&engine);
        let route = Route::SlotId {
            slot_type: SlotType::Primary,
            slot_id: -1,
        };
        let result = client.ping_with_route(&route).await;
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        assert!(engine.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_routed_batch() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(Frame::Array(vec![Frame::Integer(1)]))));
        let client = client(&engine);
        let mut batch = Batch::pipeline().add(command::incr("{a}n"));
        let options = BatchOptions::new().route(SingleNodeRoute::SlotKey {
            slot_type: SlotType::Primary,
            key: "{a}n".to_string(),
        });

        let results = client.exec_with_options(&mut batch, &options).await.unwrap();
        assert_eq!(results, Some(vec![Frame::Integer(1)]));
        assert_eq!(engine.last_submission().unwrap().route.unwrap()[0], 5);
    }

    #[tokio::test]
    async fn test_scan_collects_every_key() {
        let engine = MockEngine::new();
        engine.respond_with(|s| {
            let Some(Control::ClusterScan { cursor, args }) = &s.control else {
                return None;
            };
            assert_eq!(args, &[Bytes::from("MATCH"), Bytes::from("k*")]);
            let (next, key) = match cursor.as_str() {
                "0" => ("node-1", "k1"),
                _ => ("finished", "k2"),
            };
            Some(Ok(Frame::Array(vec![
                Frame::from(next),
                Frame::Array(vec![Frame::from(key)]),
            ])))
        });
        let client = client(&engine);
        let options = ClusterScanOptions::new().match_pattern("k*");

        let (cursor, first) = client
            .scan_with_options(&ScanCursor::new(), &options)
            .await
            .unwrap();
        assert_eq!(first, vec!["k1"]);
        let (cursor, second) = client.scan_with_options(&cursor, &options).await.unwrap();
        assert_eq!(second, vec!["k2"]);
        assert!(cursor.is_finished());
        assert_eq!(engine.released_scan_cursors(), vec!["node-1"]);
        assert_eq!(client.dispatcher().scan_cursors(), 0);
    }

    #[tokio::test]
    async fn test_password_update_and_reset() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(Frame::SimpleString(b"OK".to_vec()))));
        let client = client(&engine);

        client.update_connection_password("pw", false).await.unwrap();
        client.reset_connection_password(true).await.unwrap();

        let sent: Vec<_> = engine.submissions().into_iter().map(|s| s.control).collect();
        assert_eq!(
            sent,
            vec![
                Some(Control::UpdatePassword {
                    password: Some("pw".to_string()),
                    immediate_auth: false,
                }),
                Some(Control::UpdatePassword {
                    password: None,
                    immediate_auth: true,
                }),
            ]
        );
    }

    #[test]
    fn test_from_reply_rejects_bad_node_key() {
        let frame = Frame::Map(vec![(Frame::Integer(1), pong())]);
        assert!(matches!(
            ClusterValue::from_reply(frame, &Route::AllNodes),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_map_on_single_node_route_stays_single() {
        let frame = Frame::Map(vec![(Frame::from("k"), Frame::Integer(1))]);
        let value = ClusterValue::from_reply(frame.clone(), &Route::Random).unwrap();
        assert_eq!(value, ClusterValue::Single(frame));
    }
}
