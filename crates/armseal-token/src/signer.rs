//! HMAC signer / verifier
//!
//! Tags are HMAC-SHA256 over the exact bytes of the encoded payload, never
//! over a re-serialized structure.

use crate::codec;
use crate::error::KeyError;
use crate::record::AssignmentRecord;
use crate::TOKEN_SEPARATOR;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted key length in bytes
pub const MIN_KEY_BYTES: usize = 32;

/// Length of an authentication tag in bytes
pub const TAG_BYTES: usize = 32;

/// Server-held secret used to sign and verify tokens
///
/// Clones carry the prepared MAC state. `Debug` never shows the secret.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    /// Build a key from raw secret material
    ///
    /// # Errors
    /// Returns [`KeyError`] if the secret is empty or shorter than
    /// [`MIN_KEY_BYTES`]
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, KeyError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(KeyError::Empty);
        }
        if secret.len() < MIN_KEY_BYTES {
            return Err(KeyError::TooShort {
                actual: secret.len(),
                minimum: MIN_KEY_BYTES,
            });
        }
        // HMAC accepts keys of any length
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| KeyError::Empty)?;
        Ok(Self { mac })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Compute the authentication tag over `payload`
#[must_use]
pub fn sign(payload: &[u8], key: &SigningKey) -> [u8; TAG_BYTES] {
    let mut mac = key.mac.clone();
    mac.update(payload);
    mac.finalize().into_bytes().into()
}

/// Check a presented tag in constant time
#[must_use]
pub fn verify(payload: &[u8], tag: &[u8], key: &SigningKey) -> bool {
    if tag.len() != TAG_BYTES {
        return false;
    }
    let expected = sign(payload, key);
    expected.as_slice().ct_eq(tag).into()
}

/// Opaque bearer token handed to the client
///
/// Serialized as a plain string. `Debug` only shows a short prefix so
/// tokens do not end up verbatim in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token string received from a client or server
    #[inline]
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the wire form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the wire form
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "SessionToken({prefix}…)")
    }
}

/// Issues signed tokens for assignment records
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: SigningKey,
}

impl TokenSigner {
    /// Create a signer over `key`
    #[inline]
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Encode and sign a record into `payload.signature`
    ///
    /// # Errors
    /// Returns error if the record cannot be serialized
    pub fn issue(&self, record: &AssignmentRecord) -> Result<SessionToken, serde_json::Error> {
        let payload = codec::encode(record)?;
        let tag = sign(payload.as_bytes(), &self.key);
        let signature = URL_SAFE_NO_PAD.encode(tag);
        Ok(SessionToken(format!("{payload}{TOKEN_SEPARATOR}{signature}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Condition;

    fn key(fill: u8) -> SigningKey {
        SigningKey::from_secret([fill; MIN_KEY_BYTES]).unwrap()
    }

    #[test]
    fn test_short_keys_rejected() {
        assert_eq!(SigningKey::from_secret("").unwrap_err(), KeyError::Empty);
        assert!(matches!(
            SigningKey::from_secret("too-short"),
            Err(KeyError::TooShort { actual: 9, .. })
        ));
    }

    #[test]
    fn test_sign_then_verify() {
        let k = key(7);
        let tag = sign(b"payload", &k);
        assert!(verify(b"payload", &tag, &k));
        assert!(!verify(b"payload!", &tag, &k));
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let tag = sign(b"payload", &key(1));
        assert!(!verify(b"payload", &tag, &key(2)));
    }

    #[test]
    fn test_verify_rejects_truncated_tag() {
        let k = key(3);
        let tag = sign(b"payload", &k);
        assert!(!verify(b"payload", &tag[..TAG_BYTES - 1], &k));
        assert!(!verify(b"payload", &[], &k));
    }

    #[test]
    fn test_rfc4231_case_6() {
        let k = SigningKey::from_secret([0xaa; 131]).unwrap();
        let tag = sign(
            b"Test Using Larger Than Block-Size Key - Hash Key First",
            &k,
        );
        let expected: [u8; TAG_BYTES] = [
            0x60, 0xe4, 0x31, 0x59, 0x1e, 0xe0, 0xb6, 0x7f, 0x0d, 0x8a, 0x26, 0xaa, 0xcb, 0xf5,
            0xb7, 0x7f, 0x8e, 0x0b, 0xc6, 0x21, 0x37, 0x28, 0xc5, 0x14, 0x05, 0x46, 0x04, 0x0f,
            0x0e, 0xe3, 0x7f, 0x54,
        ];
        assert_eq!(tag, expected);
    }

    #[test]
    fn test_issued_token_shape() {
        let signer = TokenSigner::new(key(9));
        let record = AssignmentRecord::new("s", "T2", Condition::Supportive, 5);
        let token = signer.issue(&record).unwrap();
        let (payload, signature) = token.as_str().split_once(TOKEN_SEPARATOR).unwrap();
        assert_eq!(payload, codec::encode(&record).unwrap());
        assert_eq!(URL_SAFE_NO_PAD.decode(signature).unwrap().len(), TAG_BYTES);
    }

    #[test]
    fn test_debug_does_not_leak() {
        let k = key(b'z');
        assert!(!format!("{k:?}").contains('z'));
        let token = SessionToken::new("abcdefghijklmnop.sig");
        assert!(!format!("{token:?}").contains("sig"));
    }
}
