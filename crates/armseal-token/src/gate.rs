//! Turn Authorization Gate
//!
//! The single authorization boundary for chat turns. Every turn-handling
//! path recovers its condition and scenario from here and nowhere else.
//!
//! Checks performed, in order:
//! - Token shape (exactly one separator, both halves non-empty)
//! - Signature encoding
//! - Constant-time signature comparison
//! - Payload decoding (only after the signature matched)
//!
//! The gate does no business interpretation: the recovered record is
//! returned unchanged.

use crate::codec;
use crate::error::Unauthorized;
use crate::record::{AssignmentRecord, Condition};
use crate::signer::{verify, SigningKey};
use crate::TOKEN_SEPARATOR;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Why a token was rejected
///
/// Operator-facing only. Request handlers collapse every variant into
/// [`Unauthorized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No separator, more than one, or an empty half
    Malformed,
    /// Signature half is not URL-safe base64
    SignatureEncoding,
    /// Signature does not match the payload under the current key
    SignatureMismatch,
    /// Signature matched but the payload would not decode
    Undecodable,
}

impl RejectReason {
    /// Short stable label for logs
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::SignatureEncoding => "signature_encoding",
            RejectReason::SignatureMismatch => "signature_mismatch",
            RejectReason::Undecodable => "undecodable",
        }
    }
}

/// A record whose signature has been verified
///
/// Only [`TurnGate`] can construct one, so holding an `AuthorizedRecord`
/// proves the assignment came from the assignment service unaltered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedRecord(AssignmentRecord);

impl AuthorizedRecord {
    /// Trusted arm
    #[inline]
    #[must_use]
    pub fn condition(&self) -> Condition {
        self.0.condition
    }

    /// Trusted scenario
    #[inline]
    #[must_use]
    pub fn scenario_id(&self) -> &str {
        &self.0.scenario_id
    }

    /// Correlation id, for logs only
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.0.session_id
    }

    /// Borrow the full record
    #[inline]
    #[must_use]
    pub fn record(&self) -> &AssignmentRecord {
        &self.0
    }

    /// Unwrap into the plain record
    #[inline]
    #[must_use]
    pub fn into_record(self) -> AssignmentRecord {
        self.0
    }
}

/// Token verifier bound to the current signing key
#[derive(Debug, Clone)]
pub struct TurnGate {
    key: SigningKey,
}

impl TurnGate {
    /// Create a gate over `key`
    #[inline]
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Verify a token and recover its record
    ///
    /// # Errors
    /// Returns [`Unauthorized`] for any failure, without saying which
    pub fn authorize(&self, token: &str) -> Result<AuthorizedRecord, Unauthorized> {
        self.inspect(token).map_err(|reason| {
            tracing::debug!(reason = reason.as_str(), "token rejected");
            Unauthorized
        })
    }

    /// Verify a token and report the precise rejection reason
    ///
    /// Intended for operator tooling; request paths use [`Self::authorize`].
    ///
    /// # Errors
    /// Returns the [`RejectReason`] of the first failing check
    pub fn inspect(&self, token: &str) -> Result<AuthorizedRecord, RejectReason> {
        let (payload, signature) = split_token(token).ok_or(RejectReason::Malformed)?;

        let tag = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| RejectReason::SignatureEncoding)?;

        if !verify(payload.as_bytes(), &tag, &self.key) {
            return Err(RejectReason::SignatureMismatch);
        }

        let record = codec::decode(payload).map_err(|_| RejectReason::Undecodable)?;
        Ok(AuthorizedRecord(record))
    }
}

fn split_token(token: &str) -> Option<(&str, &str)> {
    let (payload, signature) = token.split_once(TOKEN_SEPARATOR)?;
    if payload.is_empty() || signature.is_empty() || signature.contains(TOKEN_SEPARATOR) {
        return None;
    }
    Some((payload, signature))
}
