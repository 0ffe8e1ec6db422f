//! kernel-core
//!
//! Pure session logic:
//! - messages (requests from viewers, responses from the engine)
//! - outbound protocol vocabulary (message types, channels)
//! - request/response to protocol-message translation
//! - engine configuration and deployment directives

pub mod config;
pub mod error;
pub mod messages;
pub mod outbound;
pub mod translator;

pub use messages::{
    CompletionRequest,
    CompletionResponse,
    ErrorResponse,
    ExecuteRequest,
    ExecuteResponse,
    Header,
    ObjectInfoRequest,
    ObjectInfoResponse,
    Request,
    Response,
    SessionRequest,
    StreamResponse,
};

pub use config::{DeploymentDirective, EngineConfig, InitScript, StorageService};
pub use error::BrokerError;
pub use outbound::{Channel, MessageType, OutboundMessage};
pub use translator::{OperationKind, ReplyContext, Translation};
