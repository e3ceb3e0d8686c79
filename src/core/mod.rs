//! # Core
//!
//! Command encoding, the pending request registry, the engine seam and the
//! standalone client facade.
//!
//! ## Modules
//!
//! - [`command`] - Command builders and reply converters
//! - [`registry`] - Token to waiter correlation
//! - [`engine`] - Traits an engine implements
//! - [`completion`] - Completion callbacks
//! - [`dispatch`] - Submission path shared by all clients
//! - [`batch`] - Transactions and pipelines
//! - [`scan`] - Cluster scan cursors and password updates
//! - [`builder`] - Client builder

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

pub use crate::proto::error::{Error, Result};

/// Transactions and pipelines.
pub mod batch;
/// Client builder.
pub mod builder;
/// Command construction helpers.
pub mod command;
pub mod completion;
/// Connection configuration.
pub mod config;
pub mod dispatch;
pub mod engine;
pub(crate) mod handles;
pub mod lifecycle;
pub mod registry;
mod request_type;
pub mod scan;

pub use request_type::RequestType;

use crate::core::batch::{Batch, BatchOptions};
use crate::core::config::ClientConfig;
use crate::core::dispatch::Dispatcher;
use crate::core::engine::Connector;
use crate::core::lifecycle::ClientCore;
use crate::proto::frame::Frame;

/// Client for a standalone server.
///
/// Cheap to clone; clones share one engine client. The engine client is
/// closed by [`close`](Self::close) or when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use muxis_bridge::{ClientBuilder, Connector};
///
/// # async fn example(connector: &dyn Connector) -> muxis_bridge::Result<()> {
/// let client = ClientBuilder::new().address("redis://localhost:6379").connect(connector)?;
/// client.set("key", "value").await?;
/// let value = client.get("key").await?;
/// client.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
}

impl Client {
    /// Opens a client through `connector`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the configuration cannot be serialized,
    /// [`Error::Connection`] if the engine refuses it.
    pub fn open<C>(config: &ClientConfig, connector: &C) -> Result<Self>
    where
        C: Connector + ?Sized,
    {
        let config = config.clone().with_cluster_mode(false);
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

    /// Sends an arbitrary command and returns the raw reply.
    pub async fn send_command(&self, cmd: &command::Cmd) -> Result<Frame> {
        self.dispatcher.send_command(cmd, None).await
    }

    /// Like [`send_command`](Self::send_command), abandoning the request
    /// after `timeout`.
    pub async fn send_command_timeout(&self, cmd: &command::Cmd, timeout: Duration) -> Result<Frame> {
        self.dispatcher.send_command_timeout(cmd, None, timeout).await
    }

    /// Sends independent commands concurrently; results are in input order.
    pub async fn send_all(&self, cmds: &[command::Cmd]) -> Vec<Result<Frame>> {
        self.dispatcher.send_all(cmds, None).await
    }

    /// Sends a command given as its full argument list, name first.
    ///
    /// # Arguments
    ///
    /// * `args` - e.g. `["CLIENT", "NO-EVICT", "on"]`
    pub async fn custom_command<I, A>(&self, args: I) -> Result<Frame>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let frame = self.send_command(&command::custom(args)).await?;
        command::parse_frame_response(frame)
    }

    /// Sends a PING command to the server.
    ///
    /// # Returns
    ///
    /// The server's reply, normally `PONG`.
    pub async fn ping(&self) -> Result<Bytes> {
        let frame = self.send_command(&command::ping()).await?;
        Ok(command::frame_to_bytes(frame)?.unwrap_or_default())
    }

    /// Echoes the provided message back from the server.
    pub async fn echo(&self, msg: impl Into<Bytes>) -> Result<Bytes> {
        let frame = self.send_command(&command::echo(msg)).await?;
        Ok(command::frame_to_bytes(frame)?.unwrap_or_default())
    }

    /// Gets the value associated with the specified key.
    ///
    /// # Returns
    ///
    /// Returns `Some(Bytes)` if the key exists, or `None` if it does not.
    pub async fn get(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>> {
        let frame = self.send_command(&command::get(key)).await?;
        command::frame_to_bytes(frame)
    }

    /// Sets the string value of a key.
    pub async fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let frame = self.send_command(&command::set(key, value)).await?;
        command::parse_ok(frame)
    }

    /// Sets the value of a key with an expiration time.
    pub async fn set_with_expiry(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        expiry: Duration,
    ) -> Result<()> {
        let frame = self
            .send_command(&command::set_with_expiry(key, value, expiry))
            .await?;
        command::parse_ok(frame)
    }

    /// Removes the specified key.
    ///
    /// # Returns
    ///
    /// `true` if the key was removed, `false` if the key did not exist.
    pub async fn del(&self, key: impl Into<Bytes>) -> Result<bool> {
        let frame = self.send_command(&command::del(key)).await?;
        Ok(command::frame_to_int(frame)? > 0)
    }

    /// Increments the number stored at key by one.
    pub async fn incr(&self, key: impl Into<Bytes>) -> Result<i64> {
        let frame = self.send_command(&command::incr(key)).await?;
        command::frame_to_int(frame)
    }

    /// Increments the number stored at key by the specified amount.
    pub async fn incr_by(&self, key: impl Into<Bytes>, amount: i64) -> Result<i64> {
        let frame = self.send_command(&command::incr_by(key, amount)).await?;
        command::frame_to_int(frame)
    }

    /// Executes a batch with default options.
    ///
    /// See [`Dispatcher::execute`] for the result shape.
    pub async fn exec(&self, batch: &mut Batch) -> Result<Option<Vec<Frame>>> {
        self.exec_with_options(batch, &BatchOptions::default()).await
    }

    /// Executes a batch.
    ///
    /// A route in `options` is ignored by standalone engines.
    pub async fn exec_with_options(
        &self,
        batch: &mut Batch,
        options: &BatchOptions,
    ) -> Result<Option<Vec<Frame>>> {
        self.dispatcher.execute(batch, options).await
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

    /// Closes the client for every clone: pending requests fail with
    /// [`Error::Closing`], later calls are rejected. Idempotent.
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
    use crate::core::builder::ClientBuilder;
    use crate::core::request_type::RequestType;
    use crate::testing::{Control, MockEngine};

    fn client(engine: &MockEngine) -> Client {
        ClientBuilder::new().address("localhost").connect(engine).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(Frame::SimpleString(b"PONG".to_vec()))));
        let client = client(&engine);
        assert_eq!(client.ping().await.unwrap(), Bytes::from("PONG"));
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let engine = MockEngine::new();
        engine.respond_with(|s| match s.commands[0].request_type() {
            RequestType::Set => Some(Ok(Frame::SimpleString(b"OK".to_vec()))),
            RequestType::Get => Some(Ok(Frame::Null)),
            _ => None,
        });
        let client = client(&engine);
        client.set("k", "v").await.unwrap();
        assert_eq!(client.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_command_server_error() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(Frame::Error(b"ERR unknown command".to_vec()))));
        let client = client(&engine);
        let err = client.custom_command(["FOO", "bar"]).await.unwrap_err();
        assert!(matches!(err, Error::Server { .. }));

        let submission = engine.last_submission().unwrap();
        assert_eq!(submission.commands[0].request_type(), RequestType::CustomCommand);
        assert_eq!(submission.commands[0].args().len(), 2);
    }

    #[tokio::test]
    async fn test_incr_and_del() {
        let engine = MockEngine::new();
        engine.respond_with(|_| Some(Ok(Frame::Integer(1))));
        let client = client(&engine);
        assert_eq!(client.incr("n").await.unwrap(), 1);
        assert!(client.del("n").await.unwrap());
    }

    #[test]
    fn test_clones_share_engine_client() {
        let engine = MockEngine::new();
        let client = client(&engine);
        let other = client.clone();
        drop(client);
        assert_eq!(engine.close_count(), 0);
        assert!(!other.is_closed());
        drop(other);
        assert_eq!(engine.close_count(), 1);
    }

    #[test]
    fn test_open_forces_standalone_mode() {
        let engine = MockEngine::new();
        let config = ClientBuilder::new().address("a").cluster(true).build().unwrap();
        let _client = Client::open(&config, &engine).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&engine.connection_request().unwrap()).unwrap();
        assert_eq!(value["cluster_mode_enabled"], false);
    }

    #[tokio::test]
    async fn test_update_connection_password() {
        let engine = MockEngine::new();
        engine.respond_with(|s| match &s.control {
            Some(Control::UpdatePassword { password: Some(_), .. }) => {
                Some(Ok(Frame::SimpleString(b"OK".to_vec())))
            }
            _ => Some(Ok(Frame::Null)),
        });
        let client = client(&engine);

        client.update_connection_password("pw", true).await.unwrap();
        let err = client.reset_connection_password(false).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(engine.submissions().iter().all(|s| s.commands.is_empty()));
    }
}
