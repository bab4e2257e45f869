//! Condition Assignment Service
//!
//! The only place a condition is ever chosen. Each `start` draws one fair
//! bit, binds it with the scenario into a signed token and forgets it: no
//! assignment table, no memory of earlier draws.

use crate::catalog::ScenarioCatalog;
use crate::clock::{Clock, RandomSource, SystemClock, SystemRandom};
use crate::error::ExperimentError;
use crate::intake::{opening_message, OpeningMode};
use armseal_token::{AssignmentRecord, Condition, SessionToken, SigningKey, TokenSigner};
use std::sync::Arc;

/// Longest client-supplied session id accepted
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Result of a successful `start`
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Signed token the client replays on every turn
    pub token: SessionToken,
    /// The record bound into `token`
    pub record: AssignmentRecord,
    /// First assistant message, seeding the history
    pub opening_message: String,
}

impl Assignment {
    #[inline]
    #[must_use]
    pub fn condition(&self) -> Condition {
        self.record.condition
    }
}

/// Issues assignments
#[derive(Clone)]
pub struct AssignmentService {
    signer: TokenSigner,
    catalog: Arc<ScenarioCatalog>,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    opening_mode: OpeningMode,
}

impl AssignmentService {
    /// Service over the built-in catalog with OS randomness and the system
    /// clock
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self {
            signer: TokenSigner::new(key),
            catalog: Arc::new(ScenarioCatalog::builtin()),
            random: Arc::new(SystemRandom),
            clock: Arc::new(SystemClock),
            opening_mode: OpeningMode::default(),
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<ScenarioCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_opening_mode(mut self, mode: OpeningMode) -> Self {
        self.opening_mode = mode;
        self
    }

    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }

    /// Assign a condition for `scenario_id` and issue a token
    ///
    /// A missing or blank `session_id` is replaced by a fresh UUID.
    ///
    /// # Errors
    /// - [`ExperimentError::InvalidScenario`] if the scenario is unknown
    /// - [`ExperimentError::BadRequest`] if the session id is too long
    /// - [`ExperimentError::Internal`] if the record cannot be serialized
    pub fn start(
        &self,
        scenario_id: &str,
        session_id: Option<&str>,
    ) -> Result<Assignment, ExperimentError> {
        let Some(scenario) = self.catalog.get(scenario_id) else {
            return Err(ExperimentError::InvalidScenario(scenario_id.to_string()));
        };

        let session_id = match session_id.map(str::trim) {
            Some(id) if id.len() > MAX_SESSION_ID_LEN => {
                return Err(ExperimentError::BadRequest(format!(
                    "sessionId longer than {MAX_SESSION_ID_LEN} bytes"
                )));
            }
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let condition = Condition::from_bit(self.random.next_bit());
        let record = AssignmentRecord::new(
            session_id,
            scenario.id.clone(),
            condition,
            self.clock.now_ms(),
        );
        let token = self
            .signer
            .issue(&record)
            .map_err(|err| ExperimentError::Internal(err.to_string()))?;

        tracing::info!(
            session_id = %record.session_id,
            scenario_id = %record.scenario_id,
            "issued session token"
        );

        Ok(Assignment {
            token,
            opening_message: opening_message(self.opening_mode, condition, scenario),
            record,
        })
    }
}

impl std::fmt::Debug for AssignmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentService")
            .field("scenarios", &self.catalog.len())
            .field("opening_mode", &self.opening_mode)
            .finish_non_exhaustive()
    }
}
