//! Connection configuration handed to the engine.
//!
//! The bridge does not interpret configuration beyond validating addresses:
//! [`ClientConfig`] is serialized to JSON and passed to the engine as an
//! opaque connection request.

use serde::Serialize;
use url::Url;

use crate::core::registry::DEFAULT_MAX_INFLIGHT;
use crate::proto::error::{Error, Result};

/// Port used when an address does not name one.
pub const DEFAULT_PORT: u16 = 6379;

/// Wire protocol the engine should speak to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ProtocolVersion {
    /// RESP2.
    Resp2,
    /// RESP3.
    #[default]
    Resp3,
}

/// A seed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAddress {
    /// Host name or IP address.
    pub host: String,
    /// Port number.
    pub port: u16,
}

impl NodeAddress {
    /// Parses `redis://host:port`, `rediss://host:port`, `host:port` or
    /// `host`. Returns the address and whether the scheme asked for TLS.
    pub(crate) fn parse(address: &str) -> Result<(Self, bool)> {
        let invalid = || Error::InvalidAddress {
            address: address.to_string(),
        };

        let url = if address.contains("://") {
            Url::parse(address)
        } else {
            Url::parse(&format!("redis://{address}"))
        }
        .map_err(|_| invalid())?;

        let tls = match url.scheme() {
            "redis" => false,
            "rediss" => true,
            _ => return Err(invalid()),
        };
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;

        Ok((
            Self {
                host: host.to_string(),
                port: url.port().unwrap_or(DEFAULT_PORT),
            },
            tls,
        ))
    }
}

/// Credentials sent by the engine on connect.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// ACL user; `None` authenticates the default user.
    pub username: Option<String>,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated client configuration, built by
/// [`ClientBuilder`](crate::ClientBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    pub(crate) addresses: Vec<NodeAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) credentials: Option<Credentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) database_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) client_name: Option<String>,
    pub(crate) use_tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) connection_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) request_timeout_ms: Option<u64>,
    pub(crate) inflight_requests_limit: usize,
    pub(crate) protocol: ProtocolVersion,
    pub(crate) cluster_mode_enabled: bool,
}

impl ClientConfig {
    /// Seed nodes.
    pub fn addresses(&self) -> &[NodeAddress] {
        &self.addresses
    }

    /// Whether the engine connects with TLS.
    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Whether the engine runs in cluster mode.
    pub fn is_cluster(&self) -> bool {
        self.cluster_mode_enabled
    }

    /// Cap on concurrently pending requests; zero means unlimited.
    pub fn max_inflight_requests(&self) -> usize {
        self.inflight_requests_limit
    }

    pub(crate) fn with_cluster_mode(mut self, enabled: bool) -> Self {
        self.cluster_mode_enabled = enabled;
        self
    }

    /// Serializes the configuration into the engine's connection request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_connection_request(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addresses: vec![NodeAddress {
                host: "localhost".to_string(),
                port: DEFAULT_PORT,
            }],
            credentials: None,
            database_id: None,
            client_name: None,
            use_tls: false,
            connection_timeout_ms: None,
            request_timeout_ms: None,
            inflight_requests_limit: DEFAULT_MAX_INFLIGHT,
            protocol: ProtocolVersion::default(),
            cluster_mode_enabled: false,
        }
    }
}
