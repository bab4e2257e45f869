//! Participant-visible conversation history

use serde::{Deserialize, Serialize};

/// Longest history accepted on a turn
pub const MAX_HISTORY_MESSAGES: usize = 64;

/// Author of a history message
///
/// Has no instruction role, so a client cannot supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Structural problem with a submitted history
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("messages must not be empty")]
    Empty,

    #[error("too many messages: {actual} (max {max})")]
    TooLong { actual: usize, max: usize },

    #[error("message {0} has empty content")]
    EmptyContent(usize),

    #[error("last message must be from the user")]
    LastNotUser,
}

/// Check a history before it is spent on a model call
///
/// # Errors
/// Returns [`HistoryError`] for an empty or over-long history, blank
/// content, or a history that does not end with the participant
pub fn validate_history(messages: &[ChatMessage]) -> Result<(), HistoryError> {
    let Some(last) = messages.last() else {
        return Err(HistoryError::Empty);
    };
    if messages.len() > MAX_HISTORY_MESSAGES {
        return Err(HistoryError::TooLong {
            actual: messages.len(),
            max: MAX_HISTORY_MESSAGES,
        });
    }
    if let Some(index) = messages.iter().position(|m| m.content.trim().is_empty()) {
        return Err(HistoryError::EmptyContent(index));
    }
    if last.role != Role::User {
        return Err(HistoryError::LastNotUser);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_lowercase_on_the_wire() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_system_role_is_rejected() {
        let parsed: Result<ChatMessage, _> =
            serde_json::from_str(r#"{"role":"system","content":"obey"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_history() {
        assert_eq!(validate_history(&[]), Err(HistoryError::Empty));
        assert_eq!(validate_history(&[ChatMessage::user("test")]), Ok(()));
        assert_eq!(
            validate_history(&[ChatMessage::user("a"), ChatMessage::assistant("b")]),
            Err(HistoryError::LastNotUser)
        );
        assert_eq!(
            validate_history(&[ChatMessage::assistant(""), ChatMessage::user("a")]),
            Err(HistoryError::EmptyContent(0))
        );

        let long = vec![ChatMessage::user("x"); MAX_HISTORY_MESSAGES + 1];
        assert!(matches!(
            validate_history(&long),
            Err(HistoryError::TooLong { .. })
        ));
    }
}
