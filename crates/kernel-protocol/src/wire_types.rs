//! Low-level wire types and constants.
//!
//! This module defines:
//! - Inbound message type names (viewer → broker).
//! - Frame size limits.
//! - The identity stamped on outbound headers.
//!
//! The actual encode/decode logic lives in `json_codec`.

/// Maximum length of a single inbound frame (one line), in bytes.
///
/// Connection readers hold at most this much of a line in memory and
/// skip the rest of longer ones; the decoder rejects them as well.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// `username` written into every outbound header.
pub const KERNEL_USERNAME: &str = "kernel";

/// Inbound message types (viewer → broker).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireRequestType {
    /// Evaluate a code cell.
    Execute,

    /// Complete at cursor.
    Complete,

    /// Introspect a name.
    ObjectInfo,

    /// Interrupt the running operation.
    Interrupt,
}

impl WireRequestType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "execute_request" => Some(WireRequestType::Execute),
            "complete_request" => Some(WireRequestType::Complete),
            "object_info_request" => Some(WireRequestType::ObjectInfo),
            "interrupt_request" => Some(WireRequestType::Interrupt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WireRequestType::Execute => "execute_request",
            WireRequestType::Complete => "complete_request",
            WireRequestType::ObjectInfo => "object_info_request",
            WireRequestType::Interrupt => "interrupt_request",
        }
    }
}

/// A tiny helper for validating frame lengths.
pub fn validate_frame_len(len: usize) -> bool {
    len > 0 && len <= MAX_FRAME_LEN
}
