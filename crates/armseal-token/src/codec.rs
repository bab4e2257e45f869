//! Token codec
//!
//! Lossless, deterministic mapping between an [`AssignmentRecord`] and the
//! URL-safe text that forms the first half of a token.
//!
//! Decoding is only meant to run on payloads whose signature has already
//! been checked; see [`crate::TurnGate`].

use crate::error::DecodeError;
use crate::record::{AssignmentRecord, RECORD_VERSION};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Canonical bytes of a record (compact JSON, declaration field order)
///
/// # Errors
/// Returns error if serialization fails
pub fn canonical_bytes(record: &AssignmentRecord) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(record)
}

/// Encode a record as padding-free URL-safe base64
///
/// # Errors
/// Returns error if serialization fails
pub fn encode(record: &AssignmentRecord) -> Result<String, serde_json::Error> {
    let bytes = canonical_bytes(record)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a payload produced by [`encode`]
///
/// # Errors
/// Returns [`DecodeError`] on malformed base64, malformed structure,
/// missing/unknown fields, or an unsupported version
pub fn decode(encoded: &str) -> Result<AssignmentRecord, DecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
    let record: AssignmentRecord = serde_json::from_slice(&bytes)?;
    if record.version != RECORD_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: record.version,
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Condition;

    #[test]
    fn test_encoding_is_url_safe_and_unpadded() {
        let record = AssignmentRecord::new("??>>??", "T1", Condition::Supportive, 1);
        let encoded = encode(&record).unwrap();
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.ends_with('='));
        assert!(!encoded.contains('.'));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = AssignmentRecord::new("s", "T3", Condition::Informational, 99);
        let b = AssignmentRecord::new("s", "T3", Condition::Informational, 99);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(decode("not base64!"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let encoded = URL_SAFE_NO_PAD.encode(br#"{"version":1,"sessionId":"s"}"#);
        assert!(matches!(decode(&encoded), Err(DecodeError::Structure(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let encoded = URL_SAFE_NO_PAD.encode(
            br#"{"version":1,"sessionId":"s","scenarioId":"T1","condition":"supportive","issuedAt":1,"admin":true}"#,
        );
        assert!(matches!(decode(&encoded), Err(DecodeError::Structure(_))));
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let encoded = URL_SAFE_NO_PAD.encode(
            br#"{"version":2,"sessionId":"s","scenarioId":"T1","condition":"supportive","issuedAt":1}"#,
        );
        assert!(matches!(
            decode(&encoded),
            Err(DecodeError::UnsupportedVersion { found: 2 })
        ));
    }

    #[test]
    fn test_decode_rejects_padded_input() {
        let record = AssignmentRecord::new("s", "T1", Condition::Supportive, 1);
        let padded = format!("{}==", encode(&record).unwrap());
        assert!(decode(&padded).is_err());
    }
}
