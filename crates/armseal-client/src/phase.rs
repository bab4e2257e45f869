//! Phase State Machine
//!
//! Sequences one participant through the experiment:
//!
//! ```text
//! pre-measure → scenario-selection → structured-intake → timed-chat
//!             → manipulation-check → post-measure → done
//! ```
//!
//! No back-edges; [`PhaseMachine::reset`] is the only way back. The machine
//! does no I/O. Network calls are split into `begin_*` (which hands out a
//! [`Ticket`] and the request to send) and `complete_*` (which applies the
//! result only if the ticket still belongs to the current state epoch).
//! Time is passed in as wall-clock milliseconds since the Unix epoch (see
//! [`armseal_core::Clock`]), so the chat timer is driven from outside and
//! keeps counting while the host is suspended.

use crate::error::PhaseError;
use armseal_core::{compose_answers, ChatMessage, StartRequest, StartResponse, TurnRequest};
use armseal_token::SessionToken;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::time::Duration;

/// Default wall-clock budget of the chat phase
pub const DEFAULT_CHAT_BUDGET: Duration = Duration::from_secs(600);
/// Default cap on participant messages in the chat phase
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Experiment phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    PreMeasure,
    ScenarioSelection,
    StructuredIntake,
    TimedChat,
    ManipulationCheck,
    PostMeasure,
    Done,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::PreMeasure,
        Phase::ScenarioSelection,
        Phase::StructuredIntake,
        Phase::TimedChat,
        Phase::ManipulationCheck,
        Phase::PostMeasure,
        Phase::Done,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::PreMeasure => "pre-measure",
            Phase::ScenarioSelection => "scenario-selection",
            Phase::StructuredIntake => "structured-intake",
            Phase::TimedChat => "timed-chat",
            Phase::ManipulationCheck => "manipulation-check",
            Phase::PostMeasure => "post-measure",
            Phase::Done => "done",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward edges out of `from`
#[must_use]
pub fn allowed_transitions(from: Phase) -> &'static [Phase] {
    use Phase::*;
    match from {
        PreMeasure => &[ScenarioSelection],
        ScenarioSelection => &[StructuredIntake],
        StructuredIntake => &[TimedChat],
        TimedChat => &[ManipulationCheck],
        ManipulationCheck => &[PostMeasure],
        PostMeasure => &[Done],
        Done => &[],
    }
}

/// Check a forward edge
///
/// # Errors
/// Returns [`PhaseError::IllegalTransition`] if `to` is not reachable from
/// `from` in one step
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), PhaseError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PhaseError::IllegalTransition { from, to })
    }
}

/// Self-report instrument, each recorded only in its own phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Instrument {
    PreMeasure,
    ManipulationCheck,
    PostMeasure,
}

impl Instrument {
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Instrument::PreMeasure => Phase::PreMeasure,
            Instrument::ManipulationCheck => Phase::ManipulationCheck,
            Instrument::PostMeasure => Phase::PostMeasure,
        }
    }
}

/// Collected self-report answers, item name to value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measures {
    pub pre: BTreeMap<String, u8>,
    pub manipulation_check: BTreeMap<String, u8>,
    pub post: BTreeMap<String, u8>,
}

impl Measures {
    fn slot(&mut self, instrument: Instrument) -> &mut BTreeMap<String, u8> {
        match instrument {
            Instrument::PreMeasure => &mut self.pre,
            Instrument::ManipulationCheck => &mut self.manipulation_check,
            Instrument::PostMeasure => &mut self.post,
        }
    }
}

/// Chat-phase limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLimits {
    pub budget: Duration,
    pub max_turns: u32,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            budget: DEFAULT_CHAT_BUDGET,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// Why the chat phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatExit {
    TimeUp,
    TurnLimit,
    EarlyExit,
}

/// Proof of an outstanding request
///
/// Results are applied only if the ticket's epoch is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    kind: CallKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Start,
    Intake,
    Turn,
}

#[derive(Debug)]
struct InFlight {
    ticket: Ticket,
    pending: Option<ChatMessage>,
}

/// Client-side session state
#[derive(Debug)]
pub struct PhaseMachine {
    phase: Phase,
    epoch: u64,
    session_id: String,
    scenario_id: Option<String>,
    token: Option<SessionToken>,
    history: Vec<ChatMessage>,
    measures: Measures,
    limits: ChatLimits,
    /// Absolute end of the chat phase, epoch milliseconds
    deadline: Option<u64>,
    chat_turns: u32,
    chat_exit: Option<ChatExit>,
    in_flight: Option<InFlight>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new(ChatLimits::default())
    }
}

impl PhaseMachine {
    /// Fresh session in `pre-measure`
    #[must_use]
    pub fn new(limits: ChatLimits) -> Self {
        Self {
            phase: Phase::PreMeasure,
            epoch: 0,
            session_id: new_session_id(),
            scenario_id: None,
            token: None,
            history: Vec::new(),
            measures: Measures::default(),
            limits,
            deadline: None,
            chat_turns: 0,
            chat_exit: None,
            in_flight: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[inline]
    #[must_use]
    pub fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    #[inline]
    #[must_use]
    pub fn measures(&self) -> &Measures {
        &self.measures
    }

    #[inline]
    #[must_use]
    pub fn chat_turns(&self) -> u32 {
        self.chat_turns
    }

    #[inline]
    #[must_use]
    pub fn chat_exit(&self) -> Option<ChatExit> {
        self.chat_exit
    }

    /// Whether input is blocked by an outstanding request
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Time left in the chat phase, zero once the deadline has passed
    #[must_use]
    pub fn remaining(&self, now_ms: u64) -> Option<Duration> {
        self.deadline
            .filter(|_| self.phase == Phase::TimedChat)
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now_ms)))
    }

    /// Whether the chat deadline has been reached at `now_ms`
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.phase == Phase::TimedChat && self.deadline.is_some_and(|deadline| now_ms >= deadline)
    }

    /// Record one self-report answer
    ///
    /// # Errors
    /// Returns [`PhaseError::WrongPhase`] outside the instrument's phase
    pub fn record(
        &mut self,
        instrument: Instrument,
        item: impl Into<String>,
        value: u8,
    ) -> Result<(), PhaseError> {
        self.expect_phase(instrument.phase())?;
        self.measures.slot(instrument).insert(item.into(), value);
        Ok(())
    }

    /// Explicit advancement out of a measurement phase
    ///
    /// # Errors
    /// Returns [`PhaseError`] from any phase whose exit is driven by a
    /// request or the chat timer
    pub fn advance(&mut self) -> Result<Phase, PhaseError> {
        let next = match self.phase {
            Phase::PreMeasure => Phase::ScenarioSelection,
            Phase::ManipulationCheck => Phase::PostMeasure,
            Phase::PostMeasure => Phase::Done,
            from => {
                let to = allowed_transitions(from).first().copied().unwrap_or(from);
                return Err(PhaseError::IllegalTransition { from, to });
            }
        };
        self.transition(next)?;
        Ok(next)
    }

    /// Drop everything and start over with a new session id
    pub fn reset(&mut self) {
        let limits = self.limits;
        let epoch = self.epoch + 1;
        *self = Self::new(limits);
        self.epoch = epoch;
        tracing::debug!(session_id = %self.session_id, "session reset");
    }

    /// Request a token for `scenario_id`
    ///
    /// # Errors
    /// Returns [`PhaseError`] outside scenario selection or while busy
    pub fn begin_start(
        &mut self,
        scenario_id: impl Into<String>,
    ) -> Result<(Ticket, StartRequest), PhaseError> {
        self.expect_phase(Phase::ScenarioSelection)?;
        let ticket = self.issue(CallKind::Start, None)?;
        Ok((
            ticket,
            StartRequest {
                scenario_id: scenario_id.into(),
                session_id: Some(self.session_id.clone()),
            },
        ))
    }

    /// Apply a successful `start`
    ///
    /// Stores the token opaquely and seeds the history with the opening
    /// message.
    ///
    /// # Errors
    /// Returns [`PhaseError::Stale`] if the ticket is no longer current
    pub fn complete_start(
        &mut self,
        ticket: Ticket,
        response: StartResponse,
    ) -> Result<(), PhaseError> {
        self.redeem(ticket, CallKind::Start)?;
        self.transition(Phase::StructuredIntake)?;
        self.token = Some(response.token);
        self.scenario_id = Some(response.scenario_id);
        self.session_id = response.session_id;
        self.history = vec![ChatMessage::assistant(response.opening_message)];
        Ok(())
    }

    /// Submit the intake answers as one turn
    ///
    /// # Errors
    /// Returns [`PhaseError::Intake`] unless there are exactly five
    /// non-empty answers, or [`PhaseError`] outside intake or while busy
    pub fn begin_intake<S: AsRef<str>>(
        &mut self,
        answers: &[S],
    ) -> Result<(Ticket, TurnRequest), PhaseError> {
        self.expect_phase(Phase::StructuredIntake)?;
        let message = ChatMessage::user(compose_answers(answers)?);
        self.begin_turn_with(CallKind::Intake, message)
    }

    /// Apply the reply to the intake turn and start the chat timer at `now_ms`
    ///
    /// # Errors
    /// Returns [`PhaseError::Stale`] if the ticket is no longer current
    pub fn complete_intake(
        &mut self,
        ticket: Ticket,
        reply: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), PhaseError> {
        let pending = self.redeem(ticket, CallKind::Intake)?;
        self.transition(Phase::TimedChat)?;
        self.append_exchange(pending, reply.into());
        let budget_ms = u64::try_from(self.limits.budget.as_millis()).unwrap_or(u64::MAX);
        self.deadline = Some(now_ms.saturating_add(budget_ms));
        self.chat_turns = 0;
        Ok(())
    }

    /// Send one free-chat message at `now_ms`
    ///
    /// A message sent at or past the deadline ends the chat instead.
    ///
    /// # Errors
    /// Returns [`PhaseError`] for a blank message, outside the chat phase,
    /// while busy, or [`PhaseError::Stale`] once the deadline has passed
    pub fn begin_turn(
        &mut self,
        text: &str,
        now_ms: u64,
    ) -> Result<(Ticket, TurnRequest), PhaseError> {
        self.expect_phase(Phase::TimedChat)?;
        self.ensure_time_left(now_ms)?;
        if text.trim().is_empty() {
            return Err(PhaseError::EmptyMessage);
        }
        self.begin_turn_with(CallKind::Turn, ChatMessage::user(text.trim()))
    }

    /// Apply a chat reply received at `now_ms`, then check the turn cap
    ///
    /// A reply arriving at or past the deadline is dropped and the chat ends
    /// with [`ChatExit::TimeUp`], whether or not a tick was delivered first.
    ///
    /// # Errors
    /// Returns [`PhaseError::Stale`] if the chat ended or the session was
    /// reset while the request was in flight
    pub fn complete_turn(
        &mut self,
        ticket: Ticket,
        reply: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), PhaseError> {
        self.ensure_time_left(now_ms)?;
        let pending = self.redeem(ticket, CallKind::Turn)?;
        self.append_exchange(pending, reply.into());
        self.chat_turns += 1;
        if self.chat_turns >= self.limits.max_turns {
            self.end_chat(ChatExit::TurnLimit)?;
        }
        Ok(())
    }

    /// Release a ticket whose request failed, re-enabling input
    ///
    /// History and phase are left untouched.
    pub fn fail(&mut self, ticket: Ticket) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.ticket == ticket)
        {
            self.in_flight = None;
        }
    }

    /// One timer tick; ends the chat once `now_ms` reaches the deadline
    ///
    /// Ticks may be late or missing entirely; the deadline is absolute.
    /// Returns the new phase when the tick caused a transition.
    pub fn tick(&mut self, now_ms: u64) -> Option<Phase> {
        if !self.is_expired(now_ms) {
            return None;
        }
        self.end_chat(ChatExit::TimeUp).ok()?;
        Some(self.phase)
    }

    /// Leave the chat before the deadline
    ///
    /// # Errors
    /// Returns [`PhaseError::WrongPhase`] outside the chat phase
    pub fn exit_chat(&mut self) -> Result<(), PhaseError> {
        self.expect_phase(Phase::TimedChat)?;
        self.end_chat(ChatExit::EarlyExit)
    }

    fn ensure_time_left(&mut self, now_ms: u64) -> Result<(), PhaseError> {
        if self.is_expired(now_ms) {
            self.end_chat(ChatExit::TimeUp)?;
            tracing::debug!("chat deadline passed, discarding turn");
            return Err(PhaseError::Stale);
        }
        Ok(())
    }

    fn end_chat(&mut self, exit: ChatExit) -> Result<(), PhaseError> {
        self.transition(Phase::ManipulationCheck)?;
        self.chat_exit = Some(exit);
        self.deadline = None;
        tracing::debug!(?exit, turns = self.chat_turns, "chat phase ended");
        Ok(())
    }

    fn begin_turn_with(
        &mut self,
        kind: CallKind,
        message: ChatMessage,
    ) -> Result<(Ticket, TurnRequest), PhaseError> {
        let token = self.token.clone().ok_or(PhaseError::WrongPhase {
            expected: Phase::StructuredIntake,
            actual: self.phase,
        })?;
        let mut messages = self.history.clone();
        messages.push(message.clone());
        let ticket = self.issue(kind, Some(message))?;
        Ok((ticket, TurnRequest { token, messages }))
    }

    fn append_exchange(&mut self, pending: Option<ChatMessage>, reply: String) {
        self.history.extend(pending);
        self.history.push(ChatMessage::assistant(reply));
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), PhaseError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PhaseError::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }

    fn issue(&mut self, kind: CallKind, pending: Option<ChatMessage>) -> Result<Ticket, PhaseError> {
        if self.in_flight.is_some() {
            return Err(PhaseError::Busy);
        }
        let ticket = Ticket {
            epoch: self.epoch,
            kind,
        };
        self.in_flight = Some(InFlight { ticket, pending });
        Ok(ticket)
    }

    fn redeem(&mut self, ticket: Ticket, kind: CallKind) -> Result<Option<ChatMessage>, PhaseError> {
        match self.in_flight.take() {
            Some(flight) if flight.ticket == ticket && ticket.kind == kind => Ok(flight.pending),
            other => {
                self.in_flight = other;
                tracing::debug!(?ticket, "discarding stale result");
                Err(PhaseError::Stale)
            }
        }
    }

    fn transition(&mut self, to: Phase) -> Result<(), PhaseError> {
        validate_transition(self.phase, to)?;
        self.phase = to;
        self.epoch += 1;
        // Any request still outstanding belongs to the old epoch.
        self.in_flight = None;
        Ok(())
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
