//! Request handling for the experiment endpoint
//!
//! [`Experiment`] wires the assignment service, the turn gate, prompt
//! assembly and the model service together. It holds no per-session
//! state; every request is handled from its own body alone.

use crate::assignment::{Assignment, AssignmentService};
use crate::catalog::ScenarioCatalog;
use crate::clock::{Clock, RandomSource};
use crate::config::ExperimentConfig;
use crate::error::{ConfigError, ExperimentError, UpstreamError};
use crate::intake::OpeningMode;
use crate::message::{validate_history, ChatMessage};
use crate::model::{CompletionRequest, ModelService, OpenAiChatModel, DEFAULT_TEMPERATURE};
use crate::prompt::{PromptAssembler, PromptStyle};
use crate::protocol::{
    ExperimentRequest, ExperimentResponse, StartResponse, TemplatesResponse, TurnResponse,
};
use armseal_token::{SessionToken, SigningKey, TurnGate};
use std::sync::Arc;

/// Stateless experiment service
#[derive(Clone)]
pub struct Experiment {
    assignment: AssignmentService,
    gate: TurnGate,
    prompts: PromptAssembler,
    model: Arc<dyn ModelService>,
    temperature: f32,
    disclose_condition: bool,
}

impl Experiment {
    /// Service over the built-in catalog, blinded, with default prompt style
    #[must_use]
    pub fn new(key: SigningKey, model: Arc<dyn ModelService>) -> Self {
        Self {
            assignment: AssignmentService::new(key.clone()),
            gate: TurnGate::new(key),
            prompts: PromptAssembler::default(),
            model,
            temperature: DEFAULT_TEMPERATURE,
            disclose_condition: false,
        }
    }

    /// Build from startup configuration with the OpenAI-compatible client
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the catalog or HTTP client cannot be set up
    pub fn from_config(config: &ExperimentConfig) -> Result<Self, ConfigError> {
        let model = OpenAiChatModel::new(config.model.clone())?;
        let catalog = config.load_catalog()?;
        Ok(Self::new(config.signing_key.clone(), Arc::new(model))
            .with_catalog(Arc::new(catalog))
            .with_prompt_style(PromptStyle::default().with_language(&config.response_language))
            .with_opening_mode(config.opening_mode)
            .with_temperature(config.temperature)
            .with_disclose_condition(config.disclose_condition))
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<ScenarioCatalog>) -> Self {
        self.assignment = self.assignment.with_catalog(catalog);
        self
    }

    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.assignment = self.assignment.with_random(random);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.assignment = self.assignment.with_clock(clock);
        self
    }

    #[must_use]
    pub fn with_opening_mode(mut self, mode: OpeningMode) -> Self {
        self.assignment = self.assignment.with_opening_mode(mode);
        self
    }

    #[must_use]
    pub fn with_prompt_style(mut self, style: PromptStyle) -> Self {
        self.prompts = PromptAssembler::new(style);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_disclose_condition(mut self, disclose: bool) -> Self {
        self.disclose_condition = disclose;
        self
    }

    #[inline]
    #[must_use]
    pub fn discloses_condition(&self) -> bool {
        self.disclose_condition
    }

    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &ScenarioCatalog {
        self.assignment.catalog()
    }

    /// Scenario catalog listing
    #[must_use]
    pub fn templates(&self) -> TemplatesResponse {
        TemplatesResponse {
            templates: self.catalog().scenarios().to_vec(),
        }
    }

    /// Assign a condition and issue a token
    ///
    /// # Errors
    /// See [`AssignmentService::start`]
    pub fn start(
        &self,
        scenario_id: &str,
        session_id: Option<&str>,
    ) -> Result<StartResponse, ExperimentError> {
        let Assignment {
            token,
            record,
            opening_message,
        } = self.assignment.start(scenario_id, session_id)?;
        Ok(StartResponse {
            token,
            condition: self.disclose_condition.then_some(record.condition),
            scenario_id: record.scenario_id,
            session_id: record.session_id,
            opening_message,
        })
    }

    /// Relay one chat turn under the token's condition
    ///
    /// # Errors
    /// - [`ExperimentError::BadRequest`] for an invalid history, or when the
    ///   token's scenario is no longer in the catalog
    /// - [`ExperimentError::Unauthorized`] if the token fails verification
    /// - [`ExperimentError::Upstream`] if the model fails or replies with
    ///   nothing
    pub async fn turn(
        &self,
        token: &SessionToken,
        messages: &[ChatMessage],
    ) -> Result<TurnResponse, ExperimentError> {
        validate_history(messages).map_err(|err| ExperimentError::BadRequest(err.to_string()))?;

        let authorized = self.gate.authorize(token.as_str())?;
        let scenario = self.catalog().get(authorized.scenario_id()).ok_or_else(|| {
            ExperimentError::BadRequest(format!(
                "scenario {} is no longer available",
                authorized.scenario_id()
            ))
        })?;

        let request = CompletionRequest {
            messages: self.prompts.assemble(&authorized, scenario, messages),
            temperature: self.temperature,
        };
        let reply = match self.model.complete(request).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                let err = UpstreamError::EmptyCompletion { details: None };
                tracing::error!(session_id = %authorized.session_id(), error = %err, "model turn failed");
                return Err(err.into());
            }
            Err(err) => {
                tracing::error!(session_id = %authorized.session_id(), error = %err, "model turn failed");
                return Err(err.into());
            }
        };

        tracing::info!(
            session_id = %authorized.session_id(),
            scenario_id = %authorized.scenario_id(),
            history = messages.len(),
            "served turn"
        );
        Ok(TurnResponse { reply })
    }

    /// Dispatch a parsed request
    ///
    /// # Errors
    /// Whatever the dispatched operation returns
    pub async fn handle(
        &self,
        request: ExperimentRequest,
    ) -> Result<ExperimentResponse, ExperimentError> {
        match request {
            ExperimentRequest::Templates(_) => Ok(ExperimentResponse::Templates(self.templates())),
            ExperimentRequest::Start(start) => self
                .start(&start.scenario_id, start.session_id.as_deref())
                .map(ExperimentResponse::Start),
            ExperimentRequest::Turn(turn) => self
                .turn(&turn.token, &turn.messages)
                .await
                .map(ExperimentResponse::Turn),
        }
    }
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("assignment", &self.assignment)
            .field("temperature", &self.temperature)
            .field("disclose_condition", &self.disclose_condition)
            .finish_non_exhaustive()
    }
}
