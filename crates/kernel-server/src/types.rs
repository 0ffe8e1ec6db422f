//! Shared types for the session broker.
//!
//! This module defines:
//! - `ConnectionId` / `Connection`: handles for attached viewers
//! - `OperationId` / `EngineId`: identities of per-request handlers and
//!   engine instances
//! - `BrokerEvent`: everything the broker task reacts to
//! - `EngineCommand`: messages flowing from the broker to the engine
//! - channel aliases between all of the above

use std::fmt;

use kernel_core::{OutboundMessage, Request, Response, SessionRequest};
use tokio::sync::{mpsc, oneshot};

/// Identifier for an attached viewer.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Identifier for one per-request operation handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub u64);

/// Identifier for one engine instance. A restart yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Outbound messages from the broker to a given viewer.
pub type OutboundTx = mpsc::UnboundedSender<OutboundMessage>;
pub type OutboundRx = mpsc::UnboundedReceiver<OutboundMessage>;

/// An attached viewer: its identity plus the queue its writer drains.
///
/// Equality is identity: two `Connection`s are equal when their ids are.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    tx: OutboundTx,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: OutboundTx) -> Self {
        Connection { id, tx }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(id: ConnectionId) -> (Self, OutboundRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(id, tx), rx)
    }

    /// Queue a message for this viewer. Returns false if the viewer's
    /// writer is gone.
    pub fn send(&self, msg: OutboundMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

/// Everything the broker task processes, strictly in arrival order.
#[derive(Debug)]
pub enum BrokerEvent {
    /// A viewer attached.
    Register(Connection),

    /// A viewer detached.
    Unregister(ConnectionId),

    /// A viewer asked the engine for something.
    Request(SessionRequest),

    /// Interrupt the tracked operation, if any.
    Interrupt,

    /// An operation produced output for all viewers.
    Publish(OutboundMessage),

    /// An operation handler task ended.
    OperationFinished(OperationId),

    /// An engine task ended.
    EngineTerminated(EngineId),

    /// Report the broker's current state.
    Status(oneshot::Sender<BrokerStatus>),

    /// Stop processing events.
    Shutdown,
}

/// Channel into the broker task.
pub type BrokerTx = mpsc::UnboundedSender<BrokerEvent>;
pub type BrokerRx = mpsc::UnboundedReceiver<BrokerEvent>;
pub type WeakBrokerTx = mpsc::WeakUnboundedSender<BrokerEvent>;

/// Responses flowing from the engine to one operation.
pub type ReplyTx = mpsc::UnboundedSender<Response>;
pub type ReplyRx = mpsc::UnboundedReceiver<Response>;

/// Message flowing from the broker into the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Evaluate `request`; every response goes to `reply_to`.
    Request {
        operation: OperationId,
        request: Request,
        reply_to: ReplyTx,
    },

    /// Cancel whatever the engine is doing for `operation`.
    Interrupt { operation: OperationId },
}

/// Channel from broker → engine task.
pub type EngineTx = mpsc::UnboundedSender<EngineCommand>;
pub type EngineRx = mpsc::UnboundedReceiver<EngineCommand>;

/// Lifecycle state of the backing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No engine exists (no viewer attached yet, or all left).
    Absent,

    /// An engine instance is running.
    Live(EngineId),
}

/// Snapshot of the broker, answered from inside its event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    /// Number of registered connections (duplicates counted).
    pub connections: usize,

    pub engine: EngineState,

    /// Engine instances launched so far, restarts included.
    pub engine_starts: u64,

    /// Operation currently eligible for interrupt.
    pub pending_operation: Option<OperationId>,
}
