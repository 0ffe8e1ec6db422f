//! Error types for the session broker.
//!
//! Only lifecycle failures are errors here. Computation failures travel
//! as [`crate::Response::Error`] and end up as protocol messages; engine
//! crashes are recovered by restarting and never surface as errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The deployment directive did not resolve in time, so no engine
    /// can ever be placed. Fatal for the broker.
    #[error("engine unavailable: deployment directive not resolved within {waited:?}")]
    EngineUnavailable { waited: Duration },

    /// The directive source was dropped without resolving. Fatal for
    /// the broker, same as a timeout.
    #[error("engine unavailable: deployment directive source dropped")]
    DirectiveDropped,

    /// The broker task is no longer running.
    #[error("session broker stopped")]
    BrokerStopped,
}

impl BrokerError {
    /// True when the broker cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BrokerError::EngineUnavailable { .. } | BrokerError::DirectiveDropped
        )
    }
}
