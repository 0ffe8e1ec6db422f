//! Outbound notification vocabulary.
//!
//! Every message the broker delivers to viewers is an [`OutboundMessage`]:
//! a Jupyter-style `(msg_type, channel, content)` triple tagged with the
//! header and session of the request it belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::Header;

/// Logical sub-stream of the notification protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Broadcast-style output (status, echoes, streams, results).
    Iopub,

    /// Direct replies to a request.
    Shell,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Iopub => "iopub",
            Channel::Shell => "shell",
        }
    }
}

/// Outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Status,
    Pyin,
    Stream,
    ExecuteResult,
    ExecuteReply,
    Error,
    CompleteReply,
    ObjectInfoReply,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Status => "status",
            MessageType::Pyin => "pyin",
            MessageType::Stream => "stream",
            MessageType::ExecuteResult => "execute_result",
            MessageType::ExecuteReply => "execute_reply",
            MessageType::Error => "error",
            MessageType::CompleteReply => "complete_reply",
            MessageType::ObjectInfoReply => "object_info_reply",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message ready for delivery to every attached viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Header of the originating request.
    pub header: Header,

    /// Session identifier of the originating request.
    pub session: String,

    pub msg_type: MessageType,
    pub channel: Channel,
    pub content: Value,
}

impl OutboundMessage {
    /// `status` execution state carried by this message, if it is one.
    pub fn execution_state(&self) -> Option<&str> {
        match self.msg_type {
            MessageType::Status => self.content.get("execution_state").and_then(Value::as_str),
            _ => None,
        }
    }
}
