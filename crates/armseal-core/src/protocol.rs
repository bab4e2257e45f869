//! Wire types for the single `/api/chat` endpoint
//!
//! Requests are a closed union tagged by `type`. The tag is checked before
//! any field is read, and every variant rejects fields it does not know,
//! so a turn request has no way to carry a condition or scenario.

use crate::catalog::Scenario;
use crate::error::ExperimentError;
use crate::message::ChatMessage;
use armseal_token::{Condition, SessionToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tagged request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExperimentRequest {
    /// List the scenario catalog
    Templates(TemplatesRequest),
    /// Assign a condition and issue a token
    Start(StartRequest),
    /// Relay one chat turn
    Turn(TurnRequest),
}

impl ExperimentRequest {
    /// Request kind, for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Templates(_) => "templates",
            Self::Start(_) => "start",
            Self::Turn(_) => "turn",
        }
    }
}

/// `templates` carries no fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatesRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartRequest {
    #[serde(alias = "templateId")]
    pub scenario_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnRequest {
    pub token: SessionToken,
    pub messages: Vec<ChatMessage>,
}

/// Parse a raw request body
///
/// # Errors
/// Returns [`ExperimentError::BadRequest`] for invalid JSON, an unknown
/// `type`, missing fields or unknown fields
pub fn parse_request(body: &[u8]) -> Result<ExperimentRequest, ExperimentError> {
    serde_json::from_slice(body).map_err(|err| ExperimentError::BadRequest(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatesResponse {
    pub templates: Vec<Scenario>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub token: SessionToken,
    /// Only present when condition disclosure is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub scenario_id: String,
    pub session_id: String,
    pub opening_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub reply: String,
}

/// Success body, shaped by the request kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExperimentResponse {
    Templates(TemplatesResponse),
    Start(StartResponse),
    Turn(TurnResponse),
}

/// Failure body: `{error, message, details?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&ExperimentError> for ErrorBody {
    fn from(err: &ExperimentError) -> Self {
        let (message, details) = match err {
            ExperimentError::Upstream(upstream) => (upstream.to_string(), upstream.details().cloned()),
            // Operator detail stays in the logs.
            ExperimentError::Internal(_) => ("internal error".to_string(), None),
            other => (other.to_string(), None),
        };
        Self {
            error: err.kind().to_string(),
            message,
            details,
        }
    }
}
