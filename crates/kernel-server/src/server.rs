//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Spawns the single session broker task.
//! - Accepts new TCP connections and assigns each a `ConnectionId`.
//! - Spawns a per-connection task to handle I/O.
//!
//! The per-connection logic and the broker loop live in `client`
//! and `broker` respectively.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use kernel_core::DeploymentDirective;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::broker::{Broker, BrokerOptions};
use crate::client;
use crate::config::Config;
use crate::engine::EngineLauncher;
use crate::loopback::LoopbackLauncher;
use crate::types::{Connection, ConnectionId};

/// Global-ish counter for assigning unique `ConnectionId`s.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Run the TCP server with the given configuration and the loopback engine.
pub async fn run(config: Config) -> anyhow::Result<()> {
    run_with_launcher(config, Arc::new(LoopbackLauncher)).await
}

/// Run the TCP server with the given configuration and engine launcher.
///
/// Returns when interrupted with Ctrl-C, or with an error when the
/// broker hits a fatal condition.
pub async fn run_with_launcher(
    config: Config,
    launcher: Arc<dyn EngineLauncher>,
) -> anyhow::Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    let directive = std::future::ready(config.directive.clone());
    serve(listener, config, launcher, directive).await
}

/// Serve viewers accepted on `listener`. Engines are placed according
/// to `directive` once it resolves.
///
/// `config.bind_addr` and `config.port` are not used here.
pub async fn serve<F>(
    listener: TcpListener,
    config: Config,
    launcher: Arc<dyn EngineLauncher>,
    directive: F,
) -> anyhow::Result<()>
where
    F: Future<Output = DeploymentDirective> + Send + 'static,
{
    let (broker, handle) = Broker::new(
        config.engine.clone(),
        launcher,
        directive,
        BrokerOptions {
            directive_timeout: config.directive_timeout,
        },
    );
    let mut broker_task = tokio::spawn(broker.run());

    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            outcome = &mut broker_task => {
                return match outcome {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e).context("session broker failed"),
                    Err(e) => Err(e).context("session broker task panicked"),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                let _ = handle.shutdown();
                break;
            }
        };

        // A stopped broker reports why through its task, below.
        let Ok(status) = handle.status().await else {
            break;
        };
        if status.connections >= config.max_clients {
            warn!(
                %peer_addr,
                max_clients = config.max_clients,
                "rejecting connection: max_clients reached"
            );
            // Just drop the stream; the viewer sees the connection closed.
            continue;
        }

        let id = next_connection_id();
        info!(connection = %id, %peer_addr, "accepted connection");

        let (conn, out_rx) = Connection::channel(id);
        if handle.register(conn).is_err() {
            break;
        }

        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = client::run_client(id, stream, handle, out_rx).await {
                error!(connection = %id, error = %e, "connection error");
            }
        });
    }

    match broker_task.await {
        Ok(result) => result.context("session broker failed"),
        Err(e) => Err(e).context("session broker task panicked"),
    }
}
