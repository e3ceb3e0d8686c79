//! Response value types.
//!
//! This module defines the values the engine hands back for completed
//! requests: RESP2 simple strings, errors, integers, bulk strings and arrays,
//! plus the RESP3 doubles, booleans, maps and sets.

/// Frame type definitions.
pub mod types;

pub use types::Frame;
