//! Structured intake form and opening messages
//!
//! Every session opens with a short introduction followed by a fixed
//! sentence-completion form. The participant answers all fields in one
//! message before free chat begins.

use crate::catalog::Scenario;
use armseal_token::Condition;
use std::fmt::{self, Display, Write as _};
use std::str::FromStr;

/// Number of sentence-completion fields
pub const INTAKE_FIELD_COUNT: usize = 5;

/// Sentence stems, in form order
pub const INTAKE_PROMPTS: [&str; INTAKE_FIELD_COUNT] = [
    "This situation made me feel ______ the most.",
    "The strongest thought on my mind at the time was ______.",
    "What challenges me the most is ______.",
    "Right now, what I expect or need from this is ______.",
    "Something I tried before was ______ and the result was ______.",
];

/// Render the numbered intake form
#[must_use]
pub fn render_form() -> String {
    let mut form = String::from("Please complete the following sentences, each on its own line:\n");
    for (i, prompt) in INTAKE_PROMPTS.iter().enumerate() {
        let _ = write!(form, "\n{}) {prompt}", i + 1);
    }
    form
}

/// Structural problem with a set of intake answers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    /// Not exactly one answer per field
    #[error("expected {expected} answers, got {actual}")]
    WrongFieldCount { expected: usize, actual: usize },

    /// Answer at this (zero-based) position is blank
    #[error("answer {0} is empty")]
    EmptyAnswer(usize),
}

/// Check the answers and join them into a single numbered message
///
/// Whitespace runs inside an answer, line breaks included, collapse to a
/// single space so each answer stays on its own numbered line.
///
/// # Errors
/// Returns [`IntakeError`] unless there are exactly [`INTAKE_FIELD_COUNT`]
/// non-blank answers
pub fn compose_answers<S: AsRef<str>>(answers: &[S]) -> Result<String, IntakeError> {
    if answers.len() != INTAKE_FIELD_COUNT {
        return Err(IntakeError::WrongFieldCount {
            expected: INTAKE_FIELD_COUNT,
            actual: answers.len(),
        });
    }
    let mut message = String::new();
    for (i, answer) in answers.iter().enumerate() {
        let mut words = answer.as_ref().split_whitespace();
        let Some(first) = words.next() else {
            return Err(IntakeError::EmptyAnswer(i));
        };
        if i > 0 {
            message.push('\n');
        }
        let _ = write!(message, "{}) {first}", i + 1);
        for word in words {
            message.push(' ');
            message.push_str(word);
        }
    }
    Ok(message)
}

/// How the opening message is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpeningMode {
    /// Same text for both arms; the opening reveals nothing
    #[default]
    Uniform,
    /// Arm-flavored greeting ahead of the same form
    PerCondition,
}

impl OpeningMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OpeningMode::Uniform => "uniform",
            OpeningMode::PerCondition => "per-condition",
        }
    }
}

impl Display for OpeningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpeningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(OpeningMode::Uniform),
            "per-condition" | "per_condition" => Ok(OpeningMode::PerCondition),
            other => Err(format!("expected `uniform` or `per-condition`, got `{other}`")),
        }
    }
}

/// Build the opening message shown after `start`
#[must_use]
pub fn opening_message(mode: OpeningMode, condition: Condition, scenario: &Scenario) -> String {
    let intro = match (mode, condition) {
        (OpeningMode::Uniform, _) => format!(
            "We are going to have a short conversation about \"{}\". \
             To help me understand, please complete the sentences below.",
            scenario.title
        ),
        (OpeningMode::PerCondition, Condition::Supportive) => format!(
            "Thank you for sharing this with me. I'm here to listen to what \"{}\" \
             has been like for you. Whenever you're ready, please complete the sentences below.",
            scenario.title
        ),
        (OpeningMode::PerCondition, Condition::Informational) => format!(
            "Let's work through \"{}\" together and look at some practical options. \
             First, please complete the sentences below.",
            scenario.title
        ),
    };
    format!("{intro}\n\n{}", render_form())
}
