//! armseal Token
//!
//! Tamper-evident session tokens for two-arm experiments.
//!
//! # Core Concepts
//!
//! - [`AssignmentRecord`]: the immutable payload binding a session to its
//!   scenario and experimental [`Condition`]
//! - [`codec`]: canonical, URL-safe encoding of a record
//! - [`TokenSigner`]: HMAC-SHA256 signing and constant-time verification
//! - [`TurnGate`]: the single authorization boundary for chat turns
//!
//! # Example
//!
//! ```rust,ignore
//! use armseal_token::{AssignmentRecord, Condition, SigningKey, TokenSigner, TurnGate};
//!
//! let key = SigningKey::from_secret(secret)?;
//! let signer = TokenSigner::new(key.clone());
//! let token = signer.issue(&record)?;
//!
//! let gate = TurnGate::new(key);
//! let authorized = gate.authorize(token.as_str())?;
//! assert_eq!(authorized.condition(), record.condition);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod codec;
mod error;
mod gate;
mod record;
mod signer;

pub use error::{DecodeError, KeyError, Unauthorized};
pub use gate::{AuthorizedRecord, RejectReason, TurnGate};
pub use record::{AssignmentRecord, Condition, UnknownCondition, RECORD_VERSION};
pub use signer::{sign, verify, SessionToken, SigningKey, TokenSigner, MIN_KEY_BYTES, TAG_BYTES};

/// Separator between the encoded payload and its signature
pub const TOKEN_SEPARATOR: char = '.';

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
