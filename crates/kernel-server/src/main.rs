//! Notebook session broker over TCP.

use kernel_server::config::Config;
use kernel_server::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!(
        bind = %config.bind_addr,
        port = config.port,
        max_clients = config.max_clients,
        directive = %config.directive,
        "starting kernel-server"
    );

    server::run(config).await
}
