//! armseal Client
//!
//! Participant side of the signed-session protocol.
//!
//! - [`PhaseMachine`]: pure state machine over the experiment phases
//! - [`ExperimentApi`]: remote boundary (HTTP or in-process)
//! - [`ParticipantSession`]: async driver joining the two
//!
//! The client never looks inside the session token. It stores it after
//! `start` and replays it unchanged on every turn.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
mod error;
pub mod phase;
pub mod session;

pub use api::{ExperimentApi, HttpExperimentApi, InProcessApi};
pub use error::{ClientError, PhaseError};
pub use phase::{
    allowed_transitions, validate_transition, ChatExit, ChatLimits, Instrument, Measures, Phase,
    PhaseMachine, Ticket, DEFAULT_CHAT_BUDGET, DEFAULT_MAX_TURNS,
};
pub use session::ParticipantSession;
