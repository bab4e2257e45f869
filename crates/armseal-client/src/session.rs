//! Async driver pairing a [`PhaseMachine`] with an [`ExperimentApi`]
//!
//! Each call follows the same shape: take a ticket from the machine, await
//! the API, then either complete the ticket or release it. A failed call
//! leaves the machine exactly as it was, apart from re-enabling input.

use crate::api::ExperimentApi;
use crate::error::ClientError;
use crate::phase::{ChatLimits, Instrument, Phase, PhaseMachine};
use armseal_core::{Clock, SystemClock, TemplatesResponse};
use std::sync::Arc;

pub struct ParticipantSession<A> {
    api: A,
    machine: PhaseMachine,
    clock: Arc<dyn Clock>,
}

impl<A: ExperimentApi> ParticipantSession<A> {
    #[must_use]
    pub fn new(api: A) -> Self {
        Self::with_limits(api, ChatLimits::default())
    }

    #[must_use]
    pub fn with_limits(api: A, limits: ChatLimits) -> Self {
        Self {
            api,
            machine: PhaseMachine::new(limits),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock driving the chat timer
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    #[must_use]
    pub fn machine(&self) -> &PhaseMachine {
        &self.machine
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Fetch the scenario list
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails
    pub async fn templates(&self) -> Result<TemplatesResponse, ClientError> {
        self.api.templates().await
    }

    /// Record a self-report answer in the current measurement phase
    ///
    /// # Errors
    /// Returns [`ClientError::Phase`] outside the instrument's phase
    pub fn record(
        &mut self,
        instrument: Instrument,
        item: impl Into<String>,
        value: u8,
    ) -> Result<(), ClientError> {
        Ok(self.machine.record(instrument, item, value)?)
    }

    /// Explicitly move past a measurement phase
    ///
    /// # Errors
    /// Returns [`ClientError::Phase`] where advancement is not explicit
    pub fn advance(&mut self) -> Result<Phase, ClientError> {
        Ok(self.machine.advance()?)
    }

    /// Pick a scenario and receive the opening message
    ///
    /// # Errors
    /// Returns [`ClientError`] if the machine refuses or the request fails
    pub async fn choose_scenario(&mut self, scenario_id: &str) -> Result<&str, ClientError> {
        let (ticket, request) = self.machine.begin_start(scenario_id)?;
        match self.api.start(request).await {
            Ok(response) => {
                self.machine.complete_start(ticket, response)?;
                Ok(self
                    .machine
                    .history()
                    .last()
                    .map_or("", |m| m.content.as_str()))
            }
            Err(err) => {
                self.machine.fail(ticket);
                Err(err)
            }
        }
    }

    /// Submit the five intake answers; on success the chat timer starts
    ///
    /// # Errors
    /// Returns [`ClientError`] if the answers fail the structural check or
    /// the request fails
    pub async fn submit_intake<S: AsRef<str>>(&mut self, answers: &[S]) -> Result<String, ClientError> {
        let (ticket, request) = self.machine.begin_intake(answers)?;
        match self.api.turn(request).await {
            Ok(response) => {
                self.machine
                    .complete_intake(ticket, response.reply.clone(), self.clock.now_ms())?;
                Ok(response.reply)
            }
            Err(err) => {
                self.machine.fail(ticket);
                Err(err)
            }
        }
    }

    /// Send one chat message and wait for the reply
    ///
    /// # Errors
    /// Returns [`ClientError`] if the machine refuses, the request fails, or
    /// the chat ended while the request was in flight
    pub async fn send(&mut self, text: &str) -> Result<String, ClientError> {
        let (ticket, request) = self.machine.begin_turn(text, self.clock.now_ms())?;
        match self.api.turn(request).await {
            Ok(response) => {
                self.machine
                    .complete_turn(ticket, response.reply.clone(), self.clock.now_ms())?;
                Ok(response.reply)
            }
            Err(err) => {
                self.machine.fail(ticket);
                Err(err)
            }
        }
    }

    /// Timer tick; see [`PhaseMachine::tick`]
    pub fn tick(&mut self) -> Option<Phase> {
        self.machine.tick(self.clock.now_ms())
    }

    /// Leave the chat early
    ///
    /// # Errors
    /// Returns [`ClientError::Phase`] outside the chat phase
    pub fn exit_chat(&mut self) -> Result<(), ClientError> {
        Ok(self.machine.exit_chat()?)
    }

    /// Start over with a fresh session id
    pub fn reset(&mut self) {
        self.machine.reset();
    }
}
