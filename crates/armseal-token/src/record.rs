//! Assignment record and experimental conditions

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Schema version carried by every record
pub const RECORD_VERSION: u32 = 1;

/// Experimental arm a session is assigned to
///
/// Exactly two arms exist. The arm only controls the style of the
/// model-facing instructions; it is never derived from participant input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Warm, validating, reflective replies
    Supportive,
    /// Structured, solution-focused replies
    Informational,
}

impl Condition {
    /// Both arms, in canonical order
    pub const ALL: [Condition; 2] = [Condition::Supportive, Condition::Informational];

    /// Map one uniform random bit onto an arm
    #[inline]
    #[must_use]
    pub const fn from_bit(bit: bool) -> Self {
        if bit {
            Condition::Supportive
        } else {
            Condition::Informational
        }
    }

    /// Wire name of the arm
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Condition::Supportive => "supportive",
            Condition::Informational => "informational",
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supportive" => Ok(Condition::Supportive),
            "informational" => Ok(Condition::Informational),
            other => Err(UnknownCondition(other.to_string())),
        }
    }
}

/// Returned when parsing a condition name fails
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown condition: {0}")]
pub struct UnknownCondition(pub String);

/// The signed payload of a session token
///
/// Created once per session by the assignment service and never mutated.
/// Field order is the canonical serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignmentRecord {
    /// Schema version, always [`RECORD_VERSION`] for records this crate writes
    pub version: u32,
    /// Client-chosen correlation id, not trusted for authorization
    pub session_id: String,
    /// Selected scenario
    pub scenario_id: String,
    /// Assigned arm
    pub condition: Condition,
    /// Milliseconds since the Unix epoch
    pub issued_at: u64,
}

impl AssignmentRecord {
    /// Create a record at the current schema version
    #[inline]
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        scenario_id: impl Into<String>,
        condition: Condition,
        issued_at: u64,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            session_id: session_id.into(),
            scenario_id: scenario_id.into(),
            condition,
            issued_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_wire_names() {
        assert_eq!(
            serde_json::to_string(&Condition::Supportive).unwrap(),
            "\"supportive\""
        );
        assert_eq!(
            serde_json::to_string(&Condition::Informational).unwrap(),
            "\"informational\""
        );
        assert_eq!("supportive".parse::<Condition>(), Ok(Condition::Supportive));
        assert!("empathic".parse::<Condition>().is_err());
    }

    #[test]
    fn test_from_bit_covers_both_arms() {
        assert_ne!(Condition::from_bit(true), Condition::from_bit(false));
    }

    #[test]
    fn test_record_field_order_is_stable() {
        let record = AssignmentRecord::new("s-1", "T1", Condition::Informational, 42);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"version":1,"sessionId":"s-1","scenarioId":"T1","condition":"informational","issuedAt":42}"#
        );
    }
}
