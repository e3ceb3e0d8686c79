//! # Protocol
//!
//! Value types, the completion payload codec and the error taxonomy shared by
//! every layer of the bridge.
//!
//! ## Modules
//!
//! - [`codec`] - Decoder and encoder for completion payloads
//! - [`error`] - Error types
//! - [`frame`] - Frame types representing engine replies

pub mod codec;
/// Error types.
pub mod error;
pub mod frame;
