//! Request/response to protocol-message translation.
//!
//! Pure mapping, no state:
//! - [`acknowledge`] yields the messages announced *before* a request
//!   reaches the engine (busy status and code echo for executions).
//! - [`translate`] turns one engine [`Response`] into outbound messages
//!   for a given [`OperationKind`], and says whether the operation is done.
//!
//! Routing policy for executions:
//! - `Stream`            => `stream` on iopub, operation keeps running.
//! - `Execute`           => `execute_result`, idle status, `execute_reply`.
//! - `Error`, incomplete => `error`, idle status, `execute_reply`.
//! - `Error`, otherwise  => idle status, `execute_reply` (the engine has
//!   already printed the failure on a stream).

use serde_json::{json, Value};

use crate::messages::{
    CompletionResponse,
    ErrorResponse,
    ExecuteResponse,
    Header,
    ObjectInfoResponse,
    Request,
    Response,
    SessionRequest,
    StreamResponse,
};
use crate::outbound::{Channel, MessageType, OutboundMessage};

/// Docstring reported in every `object_info_reply`.
///
/// The engine's docstring is not forwarded to viewers.
pub const CALL_DOCSTRING_PLACEHOLDER: &str = "Description TBD";

/// Header and session of the request an operation answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyContext {
    pub header: Header,
    pub session: String,
}

impl ReplyContext {
    pub fn new(header: Header, session: impl Into<String>) -> Self {
        ReplyContext {
            header,
            session: session.into(),
        }
    }

    pub fn of(request: &SessionRequest) -> Self {
        ReplyContext::new(request.header.clone(), request.session.clone())
    }

    /// Build an outbound message tagged with this context.
    pub fn message(&self, msg_type: MessageType, channel: Channel, content: Value) -> OutboundMessage {
        OutboundMessage {
            header: self.header.clone(),
            session: self.session.clone(),
            msg_type,
            channel,
            content,
        }
    }

    fn status(&self, state: &str) -> OutboundMessage {
        self.message(
            MessageType::Status,
            Channel::Iopub,
            json!({ "execution_state": state }),
        )
    }
}

/// The shape of handler an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Single code execution with its counter.
    Execution { counter: u32 },
    Completion,
    ObjectInfo,
}

impl OperationKind {
    pub fn for_request(request: &Request) -> Self {
        match request {
            Request::Execute(execute) => OperationKind::Execution {
                counter: execute.counter,
            },
            Request::Completion(_) => OperationKind::Completion,
            Request::ObjectInfo(_) => OperationKind::ObjectInfo,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Execution { .. } => "execution",
            OperationKind::Completion => "completion",
            OperationKind::ObjectInfo => "object_info",
        }
    }
}

/// Outcome of feeding one response to an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Emit these messages and keep waiting for more responses.
    Continue(Vec<OutboundMessage>),

    /// Emit these messages; the operation is finished.
    Finished(Vec<OutboundMessage>),

    /// The response is not meant for this kind of operation.
    Ignored,
}

/// Messages to broadcast before a request is handed to the engine.
pub fn acknowledge(ctx: &ReplyContext, request: &Request) -> Vec<OutboundMessage> {
    match request {
        Request::Execute(execute) => vec![
            ctx.status("busy"),
            ctx.message(
                MessageType::Pyin,
                Channel::Iopub,
                json!({ "execution_count": execute.counter, "code": execute.code }),
            ),
        ],
        Request::Completion(_) | Request::ObjectInfo(_) => Vec::new(),
    }
}

/// Translate a single engine response for an operation of `kind`.
pub fn translate(kind: OperationKind, ctx: &ReplyContext, response: Response) -> Translation {
    match (kind, response) {
        (OperationKind::Execution { .. }, Response::Stream(stream)) => {
            Translation::Continue(vec![stream_message(ctx, stream)])
        }
        (OperationKind::Execution { counter }, Response::Execute(result)) => {
            Translation::Finished(execute_result(ctx, counter, result))
        }
        (OperationKind::Execution { counter }, Response::Error(error)) => {
            Translation::Finished(execute_error(ctx, counter, error))
        }
        (OperationKind::Completion, Response::Completion(completion)) => {
            Translation::Finished(vec![complete_reply(ctx, completion)])
        }
        (OperationKind::ObjectInfo, Response::ObjectInfo(info)) => {
            Translation::Finished(vec![object_info_reply(ctx, info)])
        }
        _ => Translation::Ignored,
    }
}

// -----------------------------------------------------------------------------
// Per-response shaping
// -----------------------------------------------------------------------------

fn stream_message(ctx: &ReplyContext, stream: StreamResponse) -> OutboundMessage {
    ctx.message(
        MessageType::Stream,
        Channel::Iopub,
        json!({ "text": stream.text, "name": stream.name }),
    )
}

fn execute_result(ctx: &ReplyContext, counter: u32, result: ExecuteResponse) -> Vec<OutboundMessage> {
    let mut out = vec![ctx.message(
        MessageType::ExecuteResult,
        Channel::Iopub,
        json!({
            "execution_count": counter,
            "data": { "text/html": result.html },
        }),
    )];
    out.extend(finish_execution(ctx, counter));
    out
}

fn execute_error(ctx: &ReplyContext, counter: u32, error: ErrorResponse) -> Vec<OutboundMessage> {
    let mut out = Vec::with_capacity(3);
    if error.incomplete {
        out.push(ctx.message(
            MessageType::Error,
            Channel::Iopub,
            json!({
                "execution_count": counter,
                "status": "error",
                "ename": "Error",
                "traceback": [error.message],
            }),
        ));
    }
    out.extend(finish_execution(ctx, counter));
    out
}

/// Idle status followed by the shell reply; closes every execution.
fn finish_execution(ctx: &ReplyContext, counter: u32) -> [OutboundMessage; 2] {
    [
        ctx.status("idle"),
        ctx.message(
            MessageType::ExecuteReply,
            Channel::Shell,
            json!({ "execution_count": counter }),
        ),
    ]
}

fn complete_reply(ctx: &ReplyContext, completion: CompletionResponse) -> OutboundMessage {
    // Cursor positions count characters, not bytes.
    let matched_len = completion.matched_text.chars().count();
    let cursor_start = completion.cursor_position.saturating_sub(matched_len);

    ctx.message(
        MessageType::CompleteReply,
        Channel::Shell,
        json!({
            "matched_text": completion.matched_text,
            "matches": completion.candidates,
            "cursor_start": cursor_start,
            "cursor_end": completion.cursor_position,
        }),
    )
}

fn object_info_reply(ctx: &ReplyContext, info: ObjectInfoResponse) -> OutboundMessage {
    ctx.message(
        MessageType::ObjectInfoReply,
        Channel::Shell,
        json!({
            "found": info.found,
            "name": info.name,
            "call_def": info.call_signature,
            "call_docstring": CALL_DOCSTRING_PLACEHOLDER,
        }),
    )
}
