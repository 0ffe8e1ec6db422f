//! kernel-protocol
//!
//! Wire-level encoding/decoding between notebook viewers and the
//! session broker.
//!
//! This crate is responsible for turning logical session messages
//! (`kernel_core::SessionRequest` / `OutboundMessage`) into text frames
//! and back again.
//!
//! - [`wire_types`] : message type names and limits
//! - [`json_codec`] : JSON-lines frames

pub mod json_codec;
pub mod wire_types;

pub use json_codec::{
    encode_interrupt,
    encode_outbound,
    encode_request,
    ClientFrame,
    CodecError,
    FrameDecoder,
};
