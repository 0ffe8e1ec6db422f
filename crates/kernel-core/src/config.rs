//! Engine construction parameters.
//!
//! [`EngineConfig`] is captured once when a broker is built and handed,
//! read-only, to every engine instance it launches. The
//! [`DeploymentDirective`] says *where* an instance runs and is resolved
//! asynchronously, once, before the first launch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings key for the storage service host.
pub const STORAGE_HOST_KEY: &str = "storage.connection.host";

/// Settings key for the storage service port.
pub const STORAGE_PORT_KEY: &str = "storage.connection.port";

/// Immutable configuration for engine instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local artifact repository used when resolving dependencies.
    pub local_repo: Option<PathBuf>,

    /// Remote artifact repositories, in lookup order.
    pub repositories: Vec<String>,

    /// Dependency coordinates added to the engine's classpath.
    pub dependencies: Vec<String>,

    /// Imports evaluated before any user code.
    pub imports: Vec<String>,

    /// Extra build/runtime key-value settings.
    pub settings: BTreeMap<String, String>,

    /// Scripts run, in order, when an engine starts.
    pub init_scripts: Vec<InitScript>,

    /// Arguments passed to the engine's compiler.
    pub compiler_args: Vec<String>,
}

/// A named initialization script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitScript {
    pub name: String,
    pub body: String,
}

impl InitScript {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        InitScript {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Connection settings of the storage service engines talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageService {
    pub host: String,
    pub port: u16,
}

impl EngineConfig {
    /// Merge computed storage-service settings into `settings`.
    ///
    /// Explicitly configured keys win over computed ones.
    pub fn with_storage_service(mut self, storage: &StorageService) -> Self {
        self.settings
            .entry(STORAGE_HOST_KEY.to_string())
            .or_insert_with(|| storage.host.clone());
        self.settings
            .entry(STORAGE_PORT_KEY.to_string())
            .or_insert_with(|| storage.port.to_string());
        self
    }

    /// Look up a setting by key.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// Placement of a new engine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum DeploymentDirective {
    /// Run in this process.
    #[default]
    Local,

    /// Run on a remote node.
    Remote { address: String },
}

impl fmt::Display for DeploymentDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentDirective::Local => f.write_str("local"),
            DeploymentDirective::Remote { address } => write!(f, "remote({address})"),
        }
    }
}
