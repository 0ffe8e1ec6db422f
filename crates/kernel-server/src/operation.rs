//! Per-request operations.
//!
//! Every request dispatched to the engine gets its own short-lived
//! handler task. The handler owns the reply queue the engine answers on,
//! turns each response into protocol messages, hands them to the broker
//! for broadcast, and ends after the terminal response. If the engine
//! dies first, the reply queue closes and the handler ends silently.
//!
//! Only the most recently dispatched operation is tracked for interrupt,
//! and any handler ending clears the tracking slot.

use kernel_core::translator::{translate, ReplyContext};
use kernel_core::{OperationKind, SessionRequest, Translation};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::watch;
use crate::supervisor::EngineHandle;
use crate::types::{BrokerEvent, EngineCommand, OperationId, ReplyRx, WeakBrokerTx};

/// The operation eligible to receive an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: OperationId,
    pub kind: OperationKind,
}

#[derive(Debug, Default)]
pub struct OperationTracker {
    pending: Option<PendingOperation>,
    next_id: u64,
}

impl OperationTracker {
    pub fn new() -> Self {
        OperationTracker::default()
    }

    /// Spawn a handler for `request`, track it, and send the request to
    /// `engine` with the handler as reply target. Never waits on the engine.
    pub fn dispatch(
        &mut self,
        request: SessionRequest,
        engine: &EngineHandle,
        broker: &WeakBrokerTx,
    ) -> OperationId {
        self.next_id += 1;
        let id = OperationId(self.next_id);
        let kind = OperationKind::for_request(&request.request);
        let ctx = ReplyContext::of(&request);

        let (reply_to, replies) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_operation(id, kind, ctx, replies, broker.clone()));
        watch(task, broker.clone(), BrokerEvent::OperationFinished(id));

        if let Some(previous) = self.pending.replace(PendingOperation { id, kind }) {
            debug!(operation = %previous.id, "operation no longer interruptible");
        }

        let sent = engine.send(EngineCommand::Request {
            operation: id,
            request: request.request,
            reply_to,
        });
        if sent {
            info!(operation = %id, kind = kind.name(), engine = %engine.id, "request dispatched");
        } else {
            warn!(operation = %id, engine = %engine.id, "engine queue closed, request abandoned");
        }
        id
    }

    /// Ask `engine` to cancel the tracked operation. No-op when nothing
    /// is tracked or no engine is live. Returns whether a signal was sent.
    pub fn interrupt(&self, engine: Option<&EngineHandle>) -> bool {
        let (Some(pending), Some(engine)) = (self.pending, engine) else {
            debug!("interrupt ignored, nothing to interrupt");
            return false;
        };
        info!(operation = %pending.id, engine = %engine.id, "interrupt requested");
        engine.send(EngineCommand::Interrupt {
            operation: pending.id,
        })
    }

    /// A handler ended. Clears tracking unconditionally.
    pub fn on_handler_terminated(&mut self, id: OperationId) {
        debug!(operation = %id, "operation finished");
        self.pending = None;
    }

    /// The engine died; whatever was in flight is abandoned.
    pub fn on_engine_terminated(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!(operation = %pending.id, "operation abandoned by engine termination");
        }
    }

    pub fn pending(&self) -> Option<PendingOperation> {
        self.pending
    }
}

/// Handler body: translate responses until a terminal one arrives or the
/// engine drops the reply queue.
async fn run_operation(
    id: OperationId,
    kind: OperationKind,
    ctx: ReplyContext,
    mut replies: ReplyRx,
    broker: WeakBrokerTx,
) {
    while let Some(response) = replies.recv().await {
        let (messages, done) = match translate(kind, &ctx, response) {
            Translation::Continue(messages) => (messages, false),
            Translation::Finished(messages) => (messages, true),
            Translation::Ignored => {
                debug!(operation = %id, kind = kind.name(), "response ignored");
                continue;
            }
        };

        let Some(tx) = broker.upgrade() else {
            return;
        };
        for msg in messages {
            if tx.send(BrokerEvent::Publish(msg)).is_err() {
                return;
            }
        }
        if done {
            return;
        }
    }
    debug!(operation = %id, "reply queue closed before completion");
}
