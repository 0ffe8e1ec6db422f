//! Message types exchanged between viewers, the broker and the engine.
//!
//! These are **transport-agnostic** logical messages:
//! - [`Request`]: what a viewer asks the engine to do.
//! - [`Response`]: what the engine answers, addressed to one operation.
//!
//! Wire encoding of viewer frames lives in the `kernel-protocol` crate;
//! this module is purely logical.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol header supplied by the originating viewer.
///
/// The broker never looks inside it; it is echoed back as the parent
/// header of every message produced on behalf of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(pub Value);

impl Header {
    pub fn new(value: Value) -> Self {
        Header(value)
    }

    /// The `msg_id` field, when the viewer supplied one.
    pub fn msg_id(&self) -> Option<&str> {
        self.0.get("msg_id").and_then(Value::as_str)
    }
}

/// A request into the engine.
///
/// The set is closed: every variant has exactly one operation kind
/// mapped to it in the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Evaluate a code cell.
    Execute(ExecuteRequest),

    /// Complete the identifier under the cursor.
    Completion(CompletionRequest),

    /// Look up signature/documentation for a name.
    ObjectInfo(ObjectInfoRequest),
}

/// Execute a code cell (input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    /// Execution counter shown next to the cell; echoed on `pyin`,
    /// `execute_result` and `execute_reply`.
    pub counter: u32,

    pub code: String,
}

/// Completion request (input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Text of the line being completed.
    pub text: String,

    /// Cursor position within `text`, in characters.
    pub cursor_position: usize,
}

/// Object introspection request (input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfoRequest {
    pub object_name: String,
}

/// A request together with the viewer context it arrived with.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub header: Header,
    pub session: String,
    pub request: Request,
}

impl SessionRequest {
    pub fn new(header: Header, session: impl Into<String>, request: Request) -> Self {
        SessionRequest {
            header,
            session: session.into(),
            request,
        }
    }
}

/// An event emitted by the engine towards one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Incremental output (stdout/stderr) of a running execution.
    Stream(StreamResponse),

    /// Successful end of an execution.
    Execute(ExecuteResponse),

    /// Failed end of an execution.
    Error(ErrorResponse),

    Completion(CompletionResponse),

    ObjectInfo(ObjectInfoResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResponse {
    pub text: String,

    /// Stream name, e.g. `"stdout"` or `"stderr"`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResponse {
    /// Result rendered as HTML.
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,

    /// True when the input could not be evaluated because it is
    /// syntactically unfinished. Other failures have already been
    /// reported by the engine on a stream.
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Cursor position the completion was computed for.
    pub cursor_position: usize,

    /// Candidates, in the engine's preferred order.
    pub candidates: Vec<String>,

    /// The prefix before the cursor that every candidate replaces.
    pub matched_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfoResponse {
    pub found: bool,
    pub name: String,
    pub call_signature: String,
    pub docstring: String,
}

// -----------------------------------------------------------------------------
// Convenience constructors
// -----------------------------------------------------------------------------

impl Request {
    pub fn execute(counter: u32, code: impl Into<String>) -> Self {
        Request::Execute(ExecuteRequest {
            counter,
            code: code.into(),
        })
    }

    pub fn completion(text: impl Into<String>, cursor_position: usize) -> Self {
        Request::Completion(CompletionRequest {
            text: text.into(),
            cursor_position,
        })
    }

    pub fn object_info(object_name: impl Into<String>) -> Self {
        Request::ObjectInfo(ObjectInfoRequest {
            object_name: object_name.into(),
        })
    }
}

impl Response {
    pub fn stream(name: impl Into<String>, text: impl Into<String>) -> Self {
        Response::Stream(StreamResponse {
            text: text.into(),
            name: name.into(),
        })
    }

    pub fn execute(html: impl Into<String>) -> Self {
        Response::Execute(ExecuteResponse { html: html.into() })
    }

    pub fn error(message: impl Into<String>, incomplete: bool) -> Self {
        Response::Error(ErrorResponse {
            message: message.into(),
            incomplete,
        })
    }

    pub fn completion(
        cursor_position: usize,
        candidates: Vec<String>,
        matched_text: impl Into<String>,
    ) -> Self {
        Response::Completion(CompletionResponse {
            cursor_position,
            candidates,
            matched_text: matched_text.into(),
        })
    }

    pub fn object_info(
        found: bool,
        name: impl Into<String>,
        call_signature: impl Into<String>,
        docstring: impl Into<String>,
    ) -> Self {
        Response::ObjectInfo(ObjectInfoResponse {
            found,
            name: name.into(),
            call_signature: call_signature.into(),
            docstring: docstring.into(),
        })
    }
}
