//! JSON-lines encoding/decoding for viewer frames.
//!
//! One JSON object per line in both directions.
//!
//! ```text
//! Inbound (viewer → broker)
//! -------------------------
//! {"header": {...}, "session": "...", "msg_type": "...", "content": {...}}
//!
//! execute_request:      content.code, content.execution_count (optional)
//! complete_request:     content.line or content.text, content.cursor_pos (optional)
//! object_info_request:  content.oname
//! interrupt_request:    no content
//!
//! Outbound (broker → viewer)
//! --------------------------
//! {"header": {"msg_id", "username", "session", "msg_type"},
//!  "parent_header": <request header>,
//!  "channel": "iopub" | "shell",
//!  "msg_type": "...",
//!  "metadata": {},
//!  "content": {...}}
//! ```
//!
//! When an execute request carries no `execution_count`, the decoder
//! numbers executions itself, one counter per decoder (i.e. per
//! connection).

use kernel_core::{Header, OutboundMessage, Request, SessionRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::wire_types::{validate_frame_len, WireRequestType, KERNEL_USERNAME};

/// Errors that can arise when encoding/decoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not valid JSON, or not shaped like a frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Empty or oversize frame.
    #[error("invalid frame length: {0} bytes")]
    InvalidLength(usize),

    /// Unknown or unsupported message type.
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),

    /// A required field is missing or has the wrong type.
    #[error("missing or invalid field: {0}")]
    InvalidField(&'static str),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// A request for the engine.
    Request(SessionRequest),

    /// Interrupt whatever operation is currently tracked.
    Interrupt,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    header: Value,
    #[serde(default)]
    session: Option<String>,
    msg_type: String,
    #[serde(default)]
    content: Value,
}

/// Stateful decoder for one connection's inbound frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    execution_count: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder::default()
    }

    /// Last execution counter seen or assigned.
    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// Decode a single line into a [`ClientFrame`].
    pub fn decode(&mut self, line: &str) -> Result<ClientFrame, CodecError> {
        let trimmed = line.trim();
        if !validate_frame_len(trimmed.len()) {
            return Err(CodecError::InvalidLength(trimmed.len()));
        }

        let raw: RawFrame = serde_json::from_str(trimmed)?;
        let wire_type = WireRequestType::from_name(&raw.msg_type)
            .ok_or_else(|| CodecError::UnsupportedType(raw.msg_type.clone()))?;

        let request = match wire_type {
            WireRequestType::Interrupt => return Ok(ClientFrame::Interrupt),
            WireRequestType::Execute => self.decode_execute(&raw.content)?,
            WireRequestType::Complete => decode_complete(&raw.content)?,
            WireRequestType::ObjectInfo => decode_object_info(&raw.content)?,
        };

        let session = raw
            .session
            .or_else(|| raw.header.get("session").and_then(Value::as_str).map(str::to_string))
            .ok_or(CodecError::InvalidField("session"))?;

        Ok(ClientFrame::Request(SessionRequest::new(
            Header::new(raw.header),
            session,
            request,
        )))
    }

    fn decode_execute(&mut self, content: &Value) -> Result<Request, CodecError> {
        let code = str_field(content, "code").ok_or(CodecError::InvalidField("code"))?;

        let counter = match content.get("execution_count") {
            None | Some(Value::Null) => self.execution_count.saturating_add(1),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(CodecError::InvalidField("execution_count"))?,
        };
        self.execution_count = counter;

        Ok(Request::execute(counter, code))
    }
}

fn decode_complete(content: &Value) -> Result<Request, CodecError> {
    let text = str_field(content, "line")
        .or_else(|| str_field(content, "text"))
        .ok_or(CodecError::InvalidField("text"))?;

    let cursor_position = match content.get("cursor_pos") {
        None | Some(Value::Null) => text.chars().count(),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or(CodecError::InvalidField("cursor_pos"))?,
    };

    Ok(Request::completion(text, cursor_position))
}

fn decode_object_info(content: &Value) -> Result<Request, CodecError> {
    let name = str_field(content, "oname").ok_or(CodecError::InvalidField("oname"))?;
    Ok(Request::object_info(name))
}

/// Encode an outbound message as a single line (without trailing newline).
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, CodecError> {
    let frame = json!({
        "header": {
            "msg_id": Uuid::new_v4().to_string(),
            "username": KERNEL_USERNAME,
            "session": msg.session,
            "msg_type": msg.msg_type.as_str(),
        },
        "parent_header": msg.header,
        "channel": msg.channel.as_str(),
        "msg_type": msg.msg_type.as_str(),
        "metadata": {},
        "content": msg.content,
    });
    Ok(serde_json::to_string(&frame)?)
}

/// Encode a request as an inbound frame. Used by viewer-side tools.
pub fn encode_request(req: &SessionRequest) -> Result<String, CodecError> {
    let (wire_type, content) = match &req.request {
        Request::Execute(e) => (
            WireRequestType::Execute,
            json!({ "code": e.code, "execution_count": e.counter }),
        ),
        Request::Completion(c) => (
            WireRequestType::Complete,
            json!({ "line": c.text, "cursor_pos": c.cursor_position }),
        ),
        Request::ObjectInfo(o) => (WireRequestType::ObjectInfo, json!({ "oname": o.object_name })),
    };
    encode_frame(&req.header, &req.session, wire_type, content)
}

/// Encode an interrupt frame. Used by viewer-side tools.
pub fn encode_interrupt(header: &Header, session: &str) -> Result<String, CodecError> {
    encode_frame(header, session, WireRequestType::Interrupt, json!({}))
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn encode_frame(
    header: &Header,
    session: &str,
    wire_type: WireRequestType,
    content: Value,
) -> Result<String, CodecError> {
    let frame = json!({
        "header": header,
        "session": session,
        "msg_type": wire_type.name(),
        "content": content,
    });
    Ok(serde_json::to_string(&frame)?)
}

fn str_field(content: &Value, key: &str) -> Option<String> {
    content.get(key).and_then(Value::as_str).map(str::to_string)
}
