//! kernel-server
//!
//! Multi-viewer session broker in front of a single computation engine,
//! plus a JSON-lines TCP transport.

pub mod broker;
pub mod config;
pub mod engine;
pub mod loopback;
pub mod operation;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod types;

// internal module, not re-exported
mod client;

pub use broker::{Broker, BrokerHandle, BrokerOptions};
pub use engine::{EngineContext, EngineLauncher};
pub use loopback::LoopbackLauncher;
pub use types::{
    BrokerStatus, Connection, ConnectionId, EngineCommand, EngineId, EngineState, OperationId,
};
