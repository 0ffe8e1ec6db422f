//! Engine boundary.
//!
//! The computation engine is a black box reached through an
//! [`EngineCommand`] queue. An [`EngineLauncher`] turns an
//! [`EngineContext`] into a running task; that task ending, for any
//! reason, is how the broker learns the engine terminated.

use std::sync::Arc;

use kernel_core::{DeploymentDirective, EngineConfig};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::types::{BrokerEvent, EngineId, EngineRx, WeakBrokerTx};

/// Everything an engine instance is built from.
#[derive(Debug)]
pub struct EngineContext {
    pub id: EngineId,
    pub config: Arc<EngineConfig>,
    pub directive: DeploymentDirective,
    pub commands: EngineRx,
}

/// Creates engine instances.
pub trait EngineLauncher: Send + Sync + 'static {
    /// Start an engine consuming `ctx.commands`. The returned task must
    /// run for as long as the engine is alive.
    fn launch(&self, ctx: EngineContext) -> JoinHandle<()>;
}

/// Post `event` to the broker once `task` has ended.
///
/// Panics and aborts count as ending; the event is the only signal
/// the broker gets.
pub(crate) fn watch(task: JoinHandle<()>, broker: WeakBrokerTx, event: BrokerEvent) {
    tokio::spawn(async move {
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!(?event, "watched task aborted"),
            Err(e) => warn!(?event, error = %e, "watched task panicked"),
        }
        if let Some(tx) = broker.upgrade() {
            let _ = tx.send(event);
        }
    });
}
