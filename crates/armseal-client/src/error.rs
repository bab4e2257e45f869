//! Error types for the participant client

use crate::phase::Phase;
use armseal_core::{ErrorBody, IntakeError};

/// Rejected state-machine event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    /// Edge not in the phase graph
    #[error("illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },

    /// Event only valid in another phase
    #[error("expected phase {expected}, currently {actual}")]
    WrongPhase { expected: Phase, actual: Phase },

    /// A request is already outstanding
    #[error("a request is already in flight")]
    Busy,

    /// Result belongs to an earlier state epoch and was discarded
    #[error("stale result discarded")]
    Stale,

    /// Intake answers failed the structural check
    #[error("intake: {0}")]
    Intake(#[from] IntakeError),

    /// Chat message is blank
    #[error("message must not be empty")]
    EmptyMessage,
}

/// Failure talking to the experiment API
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Request never got a response
    #[error("request failed: {0}")]
    Transport(String),

    /// Server answered with an error body
    #[error("server returned {status} {}: {}", body.error, body.message)]
    Api { status: u16, body: ErrorBody },

    /// Response body did not match the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The local state machine refused the event
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl ClientError {
    /// Machine-readable kind reported by the server, if any
    #[must_use]
    pub fn api_kind(&self) -> Option<&str> {
        match self {
            Self::Api { body, .. } => Some(&body.error),
            _ => None,
        }
    }

    /// Whether the session must restart with a fresh `start`
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}
