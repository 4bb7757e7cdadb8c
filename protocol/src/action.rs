//! # Actions
//!
//! An [`Action`] is an opaque, principal-authored intent such as
//! `"transfer:100"`. Once built it is immutable: encoding consumes a
//! reference, nothing ever mutates the bytes.
//!
//! The Issuer never sees the action itself, only its [`ActionDescriptor`]:
//! a coarse `kind`, the SHA-256 digest and the length. That is enough for an
//! issuance policy to decide, and for the Ledger to check that the
//! credential matches the action it eventually decrypts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ACTION_SIGNING_DOMAIN;
use crate::crypto::sha256;

/// Kind reported for actions that are not `kind:payload` UTF-8 text.
pub const OPAQUE_ACTION_KIND: &str = "opaque";

/// An immutable action payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Action {
    bytes: Vec<u8>,
}

/// What the Issuer is told about an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// `transfer` for `transfer:100`; [`OPAQUE_ACTION_KIND`] otherwise.
    pub kind: String,
    /// Hex SHA-256 of the action bytes.
    pub digest: String,
    /// Length of the action in bytes.
    pub length: usize,
}

impl Action {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The text before the first `:`, if the action is UTF-8 and has one.
    pub fn kind(&self) -> &str {
        std::str::from_utf8(&self.bytes)
            .ok()
            .and_then(|s| s.split_once(':'))
            .map(|(kind, _)| kind.trim())
            .filter(|kind| !kind.is_empty())
            .unwrap_or(OPAQUE_ACTION_KIND)
    }

    pub fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor {
            kind: self.kind().to_string(),
            digest: hex::encode(sha256(&self.bytes)),
            length: self.bytes.len(),
        }
    }

    /// The exact bytes an action signature commits to:
    /// `domain || u64_le(len) || action`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(ACTION_SIGNING_DOMAIN.len() + 8 + self.bytes.len());
        payload.extend_from_slice(ACTION_SIGNING_DOMAIN);
        payload.extend_from_slice(&(self.bytes.len() as u64).to_le_bytes());
        payload.extend_from_slice(&self.bytes);
        payload
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

// Actions can be confidential, so Debug shows the descriptor, not the body.
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action(kind={}, len={})", self.kind(), self.bytes.len())
    }
}
