//! Error types for token handling

/// Failure to decode an encoded payload back into a record
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not URL-safe, padding-free base64
    #[error("malformed base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Bytes are not a well-formed record (bad JSON, missing or unknown fields)
    #[error("malformed record: {0}")]
    Structure(#[from] serde_json::Error),

    /// Record was written by an unsupported schema
    #[error("unsupported record version {found}")]
    UnsupportedVersion { found: u32 },
}

/// Signing key rejected at configuration time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// No key material was supplied
    #[error("signing key is empty")]
    Empty,

    /// Key material below the minimum length
    #[error("signing key too short: {actual} bytes, need at least {minimum}")]
    TooShort { actual: usize, minimum: usize },
}

/// The only error a caller of the turn gate ever sees
///
/// Carries no detail about which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unauthorized")]
pub struct Unauthorized;
