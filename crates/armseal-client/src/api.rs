//! Experiment API as seen from the participant side
//!
//! [`ExperimentApi`] is the remote boundary the session driver talks to.
//! Two implementations: [`HttpExperimentApi`] posts JSON to a running
//! server, [`InProcessApi`] calls an [`Experiment`] directly.

use crate::error::ClientError;
use armseal_core::{
    ErrorBody, Experiment, ExperimentError, ExperimentRequest, StartRequest, StartResponse,
    TemplatesRequest, TemplatesResponse, TurnRequest, TurnResponse,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;

#[async_trait]
pub trait ExperimentApi: Send + Sync {
    async fn templates(&self) -> Result<TemplatesResponse, ClientError>;

    async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError>;

    async fn turn(&self, request: TurnRequest) -> Result<TurnResponse, ClientError>;
}

/// Posts to `/api/chat` over HTTP
#[derive(Debug, Clone)]
pub struct HttpExperimentApi {
    client: Client,
    endpoint: String,
}

impl HttpExperimentApi {
    /// Client for the server at `base_url` (e.g. `http://127.0.0.1:3000`)
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: DeserializeOwned>(&self, request: &ExperimentRequest) -> Result<T, ClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_else(|_| ErrorBody {
                error: "HTTP_ERROR".to_string(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
                details: None,
            });
            tracing::warn!(status = status.as_u16(), kind = %body.error, request = request.kind(), "request rejected");
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ExperimentApi for HttpExperimentApi {
    async fn templates(&self) -> Result<TemplatesResponse, ClientError> {
        self.post(&ExperimentRequest::Templates(TemplatesRequest {}))
            .await
    }

    async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError> {
        self.post(&ExperimentRequest::Start(request)).await
    }

    async fn turn(&self, request: TurnRequest) -> Result<TurnResponse, ClientError> {
        self.post(&ExperimentRequest::Turn(request)).await
    }
}

/// Calls an [`Experiment`] in the same process
#[derive(Debug, Clone)]
pub struct InProcessApi {
    experiment: Arc<Experiment>,
}

impl InProcessApi {
    #[must_use]
    pub fn new(experiment: Arc<Experiment>) -> Self {
        Self { experiment }
    }
}

fn api_error(err: &ExperimentError) -> ClientError {
    ClientError::Api {
        status: err.http_status(),
        body: ErrorBody::from(err),
    }
}

#[async_trait]
impl ExperimentApi for InProcessApi {
    async fn templates(&self) -> Result<TemplatesResponse, ClientError> {
        Ok(self.experiment.templates())
    }

    async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError> {
        self.experiment
            .start(&request.scenario_id, request.session_id.as_deref())
            .map_err(|err| api_error(&err))
    }

    async fn turn(&self, request: TurnRequest) -> Result<TurnResponse, ClientError> {
        self.experiment
            .turn(&request.token, &request.messages)
            .await
            .map_err(|err| api_error(&err))
    }
}
