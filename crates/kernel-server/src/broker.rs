//! Central session broker loop.
//!
//! This task owns the connection registry, the engine supervisor and
//! the operation tracker, and processes every [`BrokerEvent`] one at a
//! time, in arrival order. Nothing else touches that state, so there
//! is no locking.
//!
//! Routing policy:
//! - request acknowledgements and operation output are broadcast to
//!   **all** registered viewers;
//! - requests go to the single live engine, tagged with the operation
//!   that will receive the responses.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kernel_core::translator::{acknowledge, ReplyContext};
use kernel_core::{BrokerError, DeploymentDirective, EngineConfig, SessionRequest};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::EngineLauncher;
use crate::operation::OperationTracker;
use crate::registry::ConnectionRegistry;
use crate::supervisor::{EngineSupervisor, DEFAULT_DIRECTIVE_TIMEOUT};
use crate::types::{
    BrokerEvent, BrokerRx, BrokerStatus, BrokerTx, Connection, ConnectionId, WeakBrokerTx,
};

/// Knobs for a broker instance.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Bound on the one-time deployment directive wait.
    pub directive_timeout: Duration,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        BrokerOptions {
            directive_timeout: DEFAULT_DIRECTIVE_TIMEOUT,
        }
    }
}

/// The session broker. Build with [`Broker::new`], then drive with
/// [`Broker::run`] on its own task.
pub struct Broker {
    events: BrokerRx,
    self_tx: WeakBrokerTx,
    registry: ConnectionRegistry,
    supervisor: EngineSupervisor,
    operations: OperationTracker,
}

impl Broker {
    /// Create a broker and its handle. Does not need a Tokio runtime;
    /// resolution of `directive` starts on its own task once [`run`] is
    /// first polled.
    ///
    /// [`run`]: Broker::run
    pub fn new<F>(
        config: EngineConfig,
        launcher: Arc<dyn EngineLauncher>,
        directive: F,
        options: BrokerOptions,
    ) -> (Broker, BrokerHandle)
    where
        F: Future<Output = DeploymentDirective> + Send + 'static,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let self_tx = tx.downgrade();

        let supervisor = EngineSupervisor::new(
            launcher,
            Arc::new(config),
            directive,
            options.directive_timeout,
            self_tx.clone(),
        );

        let broker = Broker {
            events,
            self_tx,
            registry: ConnectionRegistry::new(),
            supervisor,
            operations: OperationTracker::new(),
        };
        (broker, BrokerHandle { tx })
    }

    /// Process events until shut down or every handle is dropped.
    ///
    /// Returns an error only when no engine can ever be placed.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        self.supervisor.begin_directive();

        while let Some(event) = self.events.recv().await {
            if let BrokerEvent::Shutdown = event {
                info!("session broker shutting down");
                break;
            }
            match self.handle_event(event).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "session broker stopped");
                    self.supervisor.shutdown();
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "event failed"),
            }
        }

        self.supervisor.shutdown();
        debug!("session broker loop finished");
        Ok(())
    }

    async fn handle_event(&mut self, event: BrokerEvent) -> Result<(), BrokerError> {
        match event {
            BrokerEvent::Register(conn) => self.register(conn).await?,
            BrokerEvent::Unregister(id) => self.unregister(id),
            BrokerEvent::Request(request) => self.dispatch(request),
            BrokerEvent::Interrupt => {
                self.operations.interrupt(self.supervisor.handle());
            }
            BrokerEvent::Publish(msg) => {
                self.registry.broadcast(&msg);
            }
            BrokerEvent::OperationFinished(id) => self.operations.on_handler_terminated(id),
            BrokerEvent::EngineTerminated(id) => {
                if self.supervisor.is_current(id) {
                    self.operations.on_engine_terminated();
                }
                self.supervisor.on_terminated(id).await?;
            }
            BrokerEvent::Status(reply) => self.report(reply),
            BrokerEvent::Shutdown => {}
        }
        Ok(())
    }

    async fn register(&mut self, conn: Connection) -> Result<(), BrokerError> {
        info!(connection = %conn.id, total = self.registry.len() + 1, "viewer attached");
        self.registry.add(conn);
        self.supervisor.ensure_started().await
    }

    fn unregister(&mut self, id: ConnectionId) {
        let removed = self.registry.remove(id);
        info!(connection = %id, removed, remaining = self.registry.len(), "viewer detached");

        if self.registry.is_empty() {
            self.operations.on_engine_terminated();
            self.supervisor.shutdown();
        }
    }

    fn dispatch(&mut self, request: SessionRequest) {
        let Some(engine) = self.supervisor.handle() else {
            warn!(session = %request.session, "no live engine, request dropped");
            return;
        };

        let ctx = ReplyContext::of(&request);
        for msg in acknowledge(&ctx, &request.request) {
            self.registry.broadcast(&msg);
        }
        self.operations.dispatch(request, engine, &self.self_tx);
    }

    fn report(&self, reply: oneshot::Sender<BrokerStatus>) {
        let _ = reply.send(BrokerStatus {
            connections: self.registry.len(),
            engine: self.supervisor.state(),
            engine_starts: self.supervisor.starts(),
            pending_operation: self.operations.pending().map(|p| p.id),
        });
    }
}

/// Cloneable entry point into a running broker.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    tx: BrokerTx,
}

impl BrokerHandle {
    /// Attach a viewer. Starts the engine if none is live.
    pub fn register(&self, conn: Connection) -> Result<(), BrokerError> {
        self.send(BrokerEvent::Register(conn))
    }

    /// Detach a viewer.
    pub fn unregister(&self, id: ConnectionId) -> Result<(), BrokerError> {
        self.send(BrokerEvent::Unregister(id))
    }

    /// Forward a viewer request to the engine.
    pub fn request(&self, request: SessionRequest) -> Result<(), BrokerError> {
        self.send(BrokerEvent::Request(request))
    }

    /// Interrupt the most recently dispatched operation, if still running.
    pub fn interrupt(&self) -> Result<(), BrokerError> {
        self.send(BrokerEvent::Interrupt)
    }

    /// Stop the broker after the events already queued.
    pub fn shutdown(&self) -> Result<(), BrokerError> {
        self.send(BrokerEvent::Shutdown)
    }

    /// Snapshot the broker state. Answered after every event queued
    /// before this call has been processed.
    pub async fn status(&self) -> Result<BrokerStatus, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.send(BrokerEvent::Status(tx))?;
        rx.await.map_err(|_| BrokerError::BrokerStopped)
    }

    fn send(&self, event: BrokerEvent) -> Result<(), BrokerError> {
        self.tx.send(event).map_err(|_| BrokerError::BrokerStopped)
    }
}
