//! Data Link Wire Protocol - Message framing and payload codecs
//!
//! Every message on the link is:
//! - Fixed header (8 bytes, big-endian opcode + payload length)
//! - Payload: empty, UTF-8 JSON, or a packed binary pose record

pub mod codec;
pub mod header;
pub mod payload;
pub mod pose;

pub use codec::*;
pub use header::*;
pub use payload::*;
pub use pose::*;
