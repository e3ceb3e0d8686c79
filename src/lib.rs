//! # Muxis Bridge
//!
//! Command dispatch and completion correlation for Redis/Valkey clients
//! whose networking lives in an external asynchronous engine.
//!
//! The engine owns connections, retries and cluster topology. This crate
//! turns typed commands into requests the engine accepts, tags each one with
//! a token, and resolves the waiting caller when the engine reports back on
//! that token from one of its own threads.
//!
//! ## Features
//!
//! - `cluster` - Cluster client and hash slot helpers
//! - `ffi` - Adapter for engines exported through a C ABI
//! - `test-utils` - In-process mock engine
//!
//! ## Example
//!
//! ```no_run
//! use muxis_bridge::{Batch, ClientBuilder, Connector};
//! use muxis_bridge::command::{incr, set};
//!
//! # async fn example(connector: &dyn Connector) -> muxis_bridge::Result<()> {
//! let client = ClientBuilder::new()
//!     .address("redis://localhost:6379")
//!     .connect(connector)?;
//!
//! client.set("counter", "1").await?;
//!
//! let mut batch = Batch::transaction().add(incr("counter")).add(incr("counter"));
//! let results = client.exec(&mut batch).await?;
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub(crate) mod core;
pub mod proto;

pub mod cluster;

cfg_if::cfg_if! {
    if #[cfg(feature = "ffi")] {
        pub mod ffi;
    }
}

#[cfg(test)]
mod stress;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use crate::core::command;

pub use crate::cluster::route::{Route, SingleNodeRoute, SlotType};
pub use crate::core::batch::{Batch, BatchOptions};
pub use crate::core::builder::ClientBuilder;
pub use crate::core::completion::Completions;
pub use crate::core::config::{ClientConfig, NodeAddress, ProtocolVersion};
pub use crate::core::dispatch::Dispatcher;
pub use crate::core::engine::{
    Connector, Engine, EngineError, WireBatchOptions, WirePayload, WireRequest,
};
pub use crate::core::registry::{PendingRequest, Token};
pub use crate::core::scan::{ClusterScanOptions, ObjectType, ScanCursor, FINISHED_SCAN_CURSOR};
pub use crate::core::{Client, Error, RequestType, Result};
pub use crate::proto::error::{ErrorKind, RequestErrorType};
pub use crate::proto::frame::Frame;

#[cfg(feature = "cluster")]
pub use crate::cluster::{key_slot, ClusterClient, ClusterValue};
