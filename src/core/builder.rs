use std::time::Duration;

use crate::core::config::{ClientConfig, Credentials, NodeAddress, ProtocolVersion};
use crate::core::engine::Connector;
use crate::core::registry::DEFAULT_MAX_INFLIGHT;
use crate::core::Client;
use crate::proto::error::{Error, Result};

/// Builder for a [`ClientConfig`], and shortcut to connecting a client.
///
/// # Example
///
/// ```
/// use muxis_bridge::ClientBuilder;
/// use std::time::Duration;
///
/// let config = ClientBuilder::new()
///     .address("redis://localhost:6379")
///     .password("secret")
///     .database(0)
///     .request_timeout(Duration::from_millis(500))
///     .build()
///     .unwrap();
/// assert_eq!(config.addresses()[0].port, 6379);
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    addresses: Vec<String>,
    password: Option<String>,
    username: Option<String>,
    database: Option<u32>,
    client_name: Option<String>,
    connection_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    tls: bool,
    max_inflight_requests: Option<usize>,
    protocol: ProtocolVersion,
    cluster: bool,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a seed address. May be called repeatedly.
    ///
    /// # Arguments
    ///
    /// * `address` - `redis://host:port`, `rediss://host:port` for TLS, or a
    ///   bare `host:port`
    #[inline]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Sets the password for authentication.
    #[inline]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the username for ACL authentication.
    #[inline]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the logical database to select after connecting.
    #[inline]
    pub fn database(mut self, database: u32) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the client connection name.
    ///
    /// # Arguments
    ///
    /// * `name` - Client name displayed in `CLIENT LIST`
    #[inline]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Sets the connection timeout.
    #[inline]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the per-request timeout enforced by the engine.
    #[inline]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Enables or disables TLS encryption. A `rediss://` address enables it
    /// regardless.
    #[inline]
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// Caps the number of concurrently pending requests.
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum number of requests (default: 1000, 0 for no limit)
    #[inline]
    pub fn max_inflight_requests(mut self, limit: usize) -> Self {
        self.max_inflight_requests = Some(limit);
        self
    }

    /// Sets the protocol the engine speaks to the server.
    #[inline]
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Marks the configuration as targeting a cluster.
    #[inline]
    pub fn cluster(mut self, enabled: bool) -> Self {
        self.cluster = enabled;
        self
    }

    /// Validates the collected settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no address was given or a
    /// username was given without a password, and [`Error::InvalidAddress`]
    /// for a malformed address.
    pub fn build(self) -> Result<ClientConfig> {
        if self.addresses.is_empty() {
            return Err(Error::InvalidArgument {
                message: "address is required".to_string(),
            });
        }

        let mut use_tls = self.tls;
        let mut addresses = Vec::with_capacity(self.addresses.len());
        for address in &self.addresses {
            let (node, tls) = NodeAddress::parse(address)?;
            use_tls |= tls;
            addresses.push(node);
        }

        let credentials = match (self.username, self.password) {
            (username, Some(password)) => Some(Credentials { username, password }),
            (Some(_), None) => {
                return Err(Error::InvalidArgument {
                    message: "username requires a password".to_string(),
                })
            }
            (None, None) => None,
        };

        Ok(ClientConfig {
            addresses,
            credentials,
            database_id: self.database,
            client_name: self.client_name,
            use_tls,
            connection_timeout_ms: self.connection_timeout.map(|d| d.as_millis() as u64),
            request_timeout_ms: self.request_timeout.map(|d| d.as_millis() as u64),
            inflight_requests_limit: self.max_inflight_requests.unwrap_or(DEFAULT_MAX_INFLIGHT),
            protocol: self.protocol,
            cluster_mode_enabled: self.cluster,
        })
    }

    /// Builds the configuration and opens a standalone [`Client`].
    ///
    /// # Errors
    ///
    /// Any [`build`](Self::build) error, or [`Error::Connection`] if the
    /// engine refuses the connection.
    pub fn connect<C>(self, connector: &C) -> Result<Client>
    where
        C: Connector + ?Sized,
    {
        Client::open(&self.build()?, connector)
    }

    /// Builds the configuration and opens a
    /// [`ClusterClient`](crate::ClusterClient).
    #[cfg(feature = "cluster")]
    pub fn connect_cluster<C>(self, connector: &C) -> Result<crate::cluster::ClusterClient>
    where
        C: Connector + ?Sized,
    {
        crate::cluster::ClusterClient::open(&self.build()?, connector)
    }
}
