//! Prompt Assembly
//!
//! Builds the model-facing instruction text from a trusted condition and
//! scenario. Pure and deterministic: the same inputs always yield the same
//! prompt, and nothing here reads the request body.
//!
//! Every prompt carries:
//! - The arm's tone and approach
//! - A response length band in words
//! - Exactly one follow-up question
//! - The standing prohibition (no diagnosis, no clinical authority, no
//!   medical or legal advice)
//! - The scenario as read-only background
//! - The reply language

use crate::catalog::Scenario;
use crate::message::{ChatMessage, Role};
use crate::model::{ModelMessage, ModelRole};
use armseal_token::{AuthorizedRecord, Condition};
use std::fmt::Write as _;

/// Reply language used when none is configured
pub const DEFAULT_LANGUAGE: &str = "English";

/// Knobs shared by both arms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptStyle {
    pub language: String,
    pub min_words: u32,
    pub max_words: u32,
}

impl Default for PromptStyle {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            min_words: 90,
            max_words: 140,
        }
    }
}

impl PromptStyle {
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Deterministic builder of the instruction message
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    style: PromptStyle,
}

impl PromptAssembler {
    #[must_use]
    pub fn new(style: PromptStyle) -> Self {
        Self { style }
    }

    #[inline]
    #[must_use]
    pub fn style(&self) -> &PromptStyle {
        &self.style
    }

    /// Instruction text for `condition` in `scenario`
    #[must_use]
    pub fn build_system_prompt(&self, condition: Condition, scenario: &Scenario) -> String {
        let style = &self.style;
        let mut prompt = String::new();

        let (role, tone, approach, question) = match condition {
            Condition::Supportive => (
                "emotional support",
                "empathic, warm and validating",
                "Reflect the participant's feelings back to them and normalize them. \
                 Do not give advice or action steps.",
                "Ask exactly ONE gentle follow-up question.",
            ),
            Condition::Informational => (
                "informational support",
                "structured and solution-focused",
                "Briefly summarize the situation, then give 2-3 concrete, practical steps.",
                "Ask exactly ONE clarifying question.",
            ),
        };

        let _ = writeln!(
            prompt,
            "You are a short-term {role} chatbot in a research study. You are not a therapist."
        );
        let _ = writeln!(prompt, "Respond in {}.", style.language);
        let _ = writeln!(prompt, "Style: {tone}.");
        let _ = writeln!(prompt, "{approach}");
        let _ = writeln!(prompt, "{question}");
        let _ = writeln!(
            prompt,
            "Length: {}-{} words.",
            style.min_words, style.max_words
        );
        let _ = writeln!(
            prompt,
            "Never diagnose, never claim clinical or professional authority, \
             and never give medical or legal advice."
        );
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Background (do not repeat verbatim):");
        let _ = writeln!(prompt, "Topic: {}", scenario.title);
        let _ = write!(prompt, "Description: {}", scenario.text);

        prompt
    }

    /// Instruction message followed by the replayed history
    ///
    /// Takes an [`AuthorizedRecord`], so only a verified token can select
    /// the arm.
    #[must_use]
    pub fn assemble(
        &self,
        record: &AuthorizedRecord,
        scenario: &Scenario,
        history: &[ChatMessage],
    ) -> Vec<ModelMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ModelMessage::new(
            ModelRole::System,
            self.build_system_prompt(record.condition(), scenario),
        ));
        messages.extend(history.iter().map(|m| {
            let role = match m.role {
                Role::User => ModelRole::User,
                Role::Assistant => ModelRole::Assistant,
            };
            ModelMessage::new(role, m.content.clone())
        }));
        messages
    }
}
