//! Error types for armseal Core
//!
//! Provides the error taxonomy of the experiment service:
//! - Configuration errors (fatal at startup)
//! - Client input errors (bad request shape, unknown scenario)
//! - Authorization errors (one opaque kind)
//! - Upstream model-service errors

use armseal_token::{KeyError, Unauthorized};
use serde_json::Value;
use std::path::PathBuf;

/// Error returned by a request-handling operation
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    /// Request is structurally invalid
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Scenario id is not in the catalog
    #[error("unknown scenario: {0}")]
    InvalidScenario(String),

    /// Token failed verification
    #[error("unauthorized")]
    Unauthorized(#[from] Unauthorized),

    /// Model service failed or returned nothing
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Token issuance failed
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExperimentError {
    /// Stable machine-readable kind
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InvalidScenario(_) => "INVALID_SCENARIO",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status the endpoint answers with
    #[inline]
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::InvalidScenario(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Upstream(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    /// Whether the caller's own input caused the failure
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_) | Self::InvalidScenario(_) | Self::Unauthorized(_)
        )
    }
}

/// Failure reported by (or while talking to) the model service
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection, timeout or other transport failure
    #[error("model request failed: {message}")]
    Transport { message: String, is_retryable: bool },

    /// Non-success HTTP status
    #[error("model service returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    /// Success status but no usable completion text
    #[error("model service returned no completion")]
    EmptyCompletion { details: Option<Value> },

    /// Success status but a body we could not parse
    #[error("failed to parse model response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Raw upstream payload, when one was received
    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Status { details, .. } | Self::EmptyCompletion { details } => details.as_ref(),
            Self::Transport { .. } | Self::Malformed(_) => None,
        }
    }

    /// Whether retrying the same request could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { is_retryable, .. } => *is_retryable,
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::EmptyCompletion { .. } | Self::Malformed(_) => false,
        }
    }
}

/// Fatal startup configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable absent or blank
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// Signing key rejected
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(#[from] KeyError),

    /// Variable present but unparseable
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    /// Scenario catalog could not be loaded
    #[error("scenario catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// HTTP client for the model service could not be built
    #[error("model client: {0}")]
    HttpClient(String),
}

/// Scenario catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Catalog file unreadable
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog file is not valid TOML of the expected shape
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    /// No scenarios defined
    #[error("catalog is empty")]
    Empty,

    /// Two scenarios share an id
    #[error("duplicate scenario id: {0}")]
    DuplicateId(String),

    /// A scenario has a blank id, title or text
    #[error("scenario {index} has a blank {field}")]
    BlankField { index: usize, field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_client_fault() {
        let cases = [
            (ExperimentError::BadRequest("x".into()), 400, true),
            (ExperimentError::InvalidScenario("T9".into()), 400, true),
            (ExperimentError::Unauthorized(Unauthorized), 401, true),
            (
                ExperimentError::Upstream(UpstreamError::EmptyCompletion { details: None }),
                502,
                false,
            ),
            (ExperimentError::Internal("boom".into()), 500, false),
        ];
        for (err, status, client) in cases {
            assert_eq!(err.http_status(), status, "{}", err.kind());
            assert_eq!(err.is_client_error(), client, "{}", err.kind());
        }
    }
}
