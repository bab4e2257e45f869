//! armseal Core
//!
//! Server side of the signed-session protocol: condition assignment,
//! prompt assembly, and relaying chat turns to a model service.
//!
//! # Core Concepts
//!
//! - [`AssignmentService`]: the one place a condition is drawn
//! - [`PromptAssembler`]: deterministic instruction text per condition
//! - [`ModelService`]: opaque text-completion boundary
//! - [`Experiment`]: stateless request handler over all of the above
//!
//! # Request flow
//!
//! ```text
//! start ─► AssignmentService ─► token + opening message
//! turn  ─► TurnGate ─► PromptAssembler ─► ModelService ─► reply
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod assignment;
pub mod catalog;
pub mod clock;
pub mod config;
mod error;
pub mod experiment;
pub mod intake;
pub mod message;
pub mod model;
pub mod prompt;
pub mod protocol;

pub use assignment::{Assignment, AssignmentService, MAX_SESSION_ID_LEN};
pub use catalog::{Scenario, ScenarioCatalog};
pub use clock::{Clock, RandomSource, SeededRandom, SystemClock, SystemRandom};
pub use config::ExperimentConfig;
pub use error::{CatalogError, ConfigError, ExperimentError, UpstreamError};
pub use experiment::Experiment;
pub use intake::{compose_answers, opening_message, render_form, IntakeError, OpeningMode};
pub use message::{validate_history, ChatMessage, HistoryError, Role};
pub use model::{CompletionRequest, ModelMessage, ModelRole, ModelService, ModelSettings, OpenAiChatModel};
pub use prompt::{PromptAssembler, PromptStyle};
pub use protocol::{
    parse_request, ErrorBody, ExperimentRequest, ExperimentResponse, StartRequest, StartResponse,
    TemplatesRequest, TemplatesResponse, TurnRequest, TurnResponse,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
