//! # Cluster
//!
//! Routing intent for cluster deployments and the cluster client facade.
//!
//! The engine discovers topology and follows redirects. This module only
//! describes where a command should go: a [`Route`](route::Route) is encoded
//! into a compact tagged form and handed across the boundary with the
//! command.
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "cluster")]
//! # async fn example(connector: &dyn muxis_bridge::Connector) -> muxis_bridge::Result<()> {
//! use muxis_bridge::{ClientBuilder, Route};
//!
//! let client = ClientBuilder::new()
//!     .address("127.0.0.1:7000")
//!     .address("127.0.0.1:7001")
//!     .connect_cluster(connector)?;
//!
//! let replies = client.ping_with_route(&Route::AllPrimaries).await?;
//! let one = client.ping_with_route(&Route::by_address("127.0.0.1:7001")?).await?;
//! # Ok(())
//! # }
//! ```

pub mod route;

cfg_if::cfg_if! {
    if #[cfg(feature = "cluster")] {
        mod client;
        mod slot;

        pub use client::{ClusterClient, ClusterValue};
        pub use slot::key_slot;
    }
}
