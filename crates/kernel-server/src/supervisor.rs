//! Lifecycle of the single backing engine.
//!
//! States: `Absent` → (`ensure_started`) → `Live` → (termination) → `Live`
//! with a new id, and `Live` → (`shutdown`) → `Absent` once no viewer is
//! attached.
//!
//! The deployment directive is resolved once, on its own task started by
//! `begin_directive`. The first start waits for it, bounded by
//! `directive_timeout`; every later start reuses it.
//! A crashing engine is restarted every time, with no backoff.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use kernel_core::{BrokerError, DeploymentDirective, EngineConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::engine::{watch, EngineContext, EngineLauncher};
use crate::types::{BrokerEvent, EngineCommand, EngineId, EngineState, EngineTx, WeakBrokerTx};

/// Default bound on the deployment directive wait.
pub const DEFAULT_DIRECTIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Reference to the live engine instance.
#[derive(Debug)]
pub struct EngineHandle {
    pub id: EngineId,
    commands: EngineTx,
    abort: AbortHandle,
}

impl EngineHandle {
    /// Queue a command for the engine. Returns false if the engine is gone.
    pub fn send(&self, cmd: EngineCommand) -> bool {
        self.commands.send(cmd).is_ok()
    }
}

type DirectiveFuture = Pin<Box<dyn Future<Output = DeploymentDirective> + Send>>;

enum Directive {
    Pending(oneshot::Receiver<DeploymentDirective>),
    Resolved(DeploymentDirective),
}

pub struct EngineSupervisor {
    launcher: Arc<dyn EngineLauncher>,
    config: Arc<EngineConfig>,
    directive: Directive,
    directive_source: Option<(DirectiveFuture, oneshot::Sender<DeploymentDirective>)>,
    directive_timeout: Duration,
    current: Option<EngineHandle>,
    starts: u64,
    events: WeakBrokerTx,
}

impl EngineSupervisor {
    /// Build a supervisor. Nothing is spawned until [`begin_directive`],
    /// so this works outside a Tokio runtime.
    ///
    /// [`begin_directive`]: EngineSupervisor::begin_directive
    pub fn new<F>(
        launcher: Arc<dyn EngineLauncher>,
        config: Arc<EngineConfig>,
        directive: F,
        directive_timeout: Duration,
        events: WeakBrokerTx,
    ) -> Self
    where
        F: Future<Output = DeploymentDirective> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let source: DirectiveFuture = Box::pin(directive);

        EngineSupervisor {
            launcher,
            config,
            directive: Directive::Pending(rx),
            directive_source: Some((source, tx)),
            directive_timeout,
            current: None,
            starts: 0,
            events,
        }
    }

    /// Drive the directive future on its own task. Must run inside a
    /// Tokio runtime; only the first call does anything.
    pub fn begin_directive(&mut self) {
        let Some((directive, tx)) = self.directive_source.take() else {
            return;
        };
        tokio::spawn(async move {
            let resolved = directive.await;
            debug!(directive = %resolved, "deployment directive resolved");
            let _ = tx.send(resolved);
        });
    }

    /// Start an engine unless one is already live.
    pub async fn ensure_started(&mut self) -> Result<(), BrokerError> {
        if self.current.is_some() {
            return Ok(());
        }

        let directive = self.resolve_directive().await?;

        self.starts += 1;
        let id = EngineId(self.starts);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let task = self.launcher.launch(EngineContext {
            id,
            config: Arc::clone(&self.config),
            directive: directive.clone(),
            commands: commands_rx,
        });
        let abort = task.abort_handle();
        watch(task, self.events.clone(), BrokerEvent::EngineTerminated(id));

        info!(engine = %id, %directive, "engine started");
        self.current = Some(EngineHandle { id, commands, abort });
        Ok(())
    }

    /// React to an engine task ending. Restarts when `id` is the live
    /// engine and returns whether it did; stale notices are ignored.
    pub async fn on_terminated(&mut self, id: EngineId) -> Result<bool, BrokerError> {
        if !self.is_current(id) {
            debug!(engine = %id, "stale engine termination ignored");
            return Ok(false);
        }

        error!(engine = %id, "engine terminated unexpectedly, restarting");
        self.current = None;
        self.ensure_started().await?;
        Ok(true)
    }

    /// Tear the live engine down, if any.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.current.take() {
            info!(engine = %handle.id, "engine shut down");
            handle.abort.abort();
        }
    }

    pub fn handle(&self) -> Option<&EngineHandle> {
        self.current.as_ref()
    }

    pub fn is_current(&self, id: EngineId) -> bool {
        self.current.as_ref().is_some_and(|h| h.id == id)
    }

    pub fn state(&self) -> EngineState {
        match &self.current {
            Some(handle) => EngineState::Live(handle.id),
            None => EngineState::Absent,
        }
    }

    /// Number of engines launched so far.
    pub fn starts(&self) -> u64 {
        self.starts
    }

    async fn resolve_directive(&mut self) -> Result<DeploymentDirective, BrokerError> {
        self.begin_directive();
        let resolved = match &mut self.directive {
            Directive::Resolved(directive) => return Ok(directive.clone()),
            Directive::Pending(rx) => match timeout(self.directive_timeout, rx).await {
                Ok(Ok(directive)) => directive,
                Ok(Err(_)) => return Err(BrokerError::DirectiveDropped),
                Err(_) => {
                    return Err(BrokerError::EngineUnavailable {
                        waited: self.directive_timeout,
                    })
                }
            },
        };
        self.directive = Directive::Resolved(resolved.clone());
        Ok(resolved)
    }
}
