//! RESP payload codec.
//!
//! Completion payloads arrive as one complete RESP2/RESP3 value. The decoder
//! turns them into [`Frame`](crate::proto::frame::Frame)s on the callback
//! thread; the encoder is the inverse, for engines written in Rust and tests.

mod decoder;
mod encoder;

pub use decoder::{decode_payload, Decoder};
pub use encoder::{encode_frame, Encoder};
