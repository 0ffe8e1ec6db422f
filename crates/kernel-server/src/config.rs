//! Configuration for the session broker server.
//!
//! Defaults can be overridden via environment variables:
//!
//! - `KERNEL_BIND_ADDR`              (default: "0.0.0.0")
//! - `KERNEL_PORT`                   (default: "9010")
//! - `KERNEL_MAX_CLIENTS`            (default: "64")
//! - `KERNEL_DIRECTIVE_TIMEOUT_SECS` (default: "120")
//! - `KERNEL_ENGINE_CONFIG`          (optional path to a TOML `EngineConfig`)
//! - `KERNEL_REMOTE_ADDR`            (optional remote placement; local otherwise)
//! - `KERNEL_STORAGE_HOST`, `KERNEL_STORAGE_PORT` (optional storage service)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use kernel_core::{DeploymentDirective, EngineConfig, StorageService};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("cannot read engine config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid engine config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously attached viewers.
    pub max_clients: usize,

    /// Bound on the deployment directive wait before the first engine start.
    pub directive_timeout: Duration,

    /// Parameters handed to every engine instance.
    pub engine: EngineConfig,

    /// Where engines are placed.
    pub directive: DeploymentDirective,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 9010,
            max_clients: 64,
            directive_timeout: Duration::from_secs(120),
            engine: EngineConfig::default(),
            directive: DeploymentDirective::Local,
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to reasonable defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let bind_addr = env::var("KERNEL_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_env_or_default("KERNEL_PORT", defaults.port)?;
        let max_clients = read_env_or_default("KERNEL_MAX_CLIENTS", defaults.max_clients)?;
        let directive_timeout = Duration::from_secs(read_env_or_default(
            "KERNEL_DIRECTIVE_TIMEOUT_SECS",
            defaults.directive_timeout.as_secs(),
        )?);

        let mut engine = match env::var("KERNEL_ENGINE_CONFIG") {
            Ok(path) => load_engine_config(Path::new(&path))?,
            Err(_) => defaults.engine,
        };
        if let Ok(host) = env::var("KERNEL_STORAGE_HOST") {
            let port = read_env_or_default("KERNEL_STORAGE_PORT", 9042u16)?;
            engine = engine.with_storage_service(&StorageService { host, port });
        }

        let directive = match env::var("KERNEL_REMOTE_ADDR") {
            Ok(address) if !address.trim().is_empty() => DeploymentDirective::Remote { address },
            _ => DeploymentDirective::Local,
        };

        Ok(Config {
            bind_addr,
            port,
            max_clients,
            directive_timeout,
            engine,
            directive,
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Read an [`EngineConfig`] from a TOML file.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_engine_config(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse an [`EngineConfig`] from TOML text.
pub fn parse_engine_config(text: &str) -> Result<EngineConfig, toml::de::Error> {
    toml::from_str(text)
}

fn read_env_or_default<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(val) => match val.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::InvalidValue { key, value: val }),
        },
        Err(_) => Ok(default),
    }
}
