//! Error types for the Civitas client protocol.
//!
//! Every fallible operation in the crate returns [`Error`]. The variants
//! split along one line that matters to callers: local, deterministic
//! failures (crypto) versus transient network failures that may succeed on
//! a later attempt. [`Error::is_retryable`] draws that line.

use thiserror::Error;

use crate::crypto::{EncryptionError, KeyGenerationError, SigningError};
use crate::submission::RejectReason;

/// Errors that can occur anywhere in the submission or reconciliation flow.
#[derive(Debug, Error)]
pub enum Error {
    /// The keypair could not be generated (entropy source failure).
    #[error(transparent)]
    KeyGeneration(#[from] KeyGenerationError),

    /// The Issuer explicitly refused to issue a credential.
    #[error("credential denied: {reason}")]
    CredentialDenied {
        /// Issuer-provided reason, or the HTTP status when none was given.
        reason: String,
    },

    /// The Issuer could not be reached or timed out.
    #[error("credential issuer unavailable: {0}")]
    CredentialUnavailable(String),

    /// The action could not be sealed.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    /// The action could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The Ledger rejected the submission. Terminal for this record.
    #[error("submission rejected: {0}")]
    Rejected(RejectReason),

    /// The Ledger could not be reached, or answered with a server error.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The pending-transaction listing could not be fetched.
    #[error("failed to fetch pending transactions: {0}")]
    FetchError(String),

    /// The transaction is not in the local pending set, or the Ledger says
    /// it was already claimed.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// A receive or reject for the same transaction is still in flight.
    #[error("receive or reject already in flight for transaction {0}")]
    ReceiveInFlight(String),

    /// The session has no keypair yet.
    #[error("no keypair in session; generate one first")]
    MissingKeys,

    /// The session's keys were replaced while an action was being prepared.
    #[error("session keys rotated during submission (epoch {expected} -> {current})")]
    KeysRotated {
        /// Epoch the action was prepared under.
        expected: u64,
        /// Epoch the session holds now.
        current: u64,
    },

    /// A network call exceeded its deadline and was cancelled.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Which operation was cancelled.
        operation: &'static str,
        /// The configured deadline.
        timeout_ms: u64,
    },

    /// Invalid configuration or malformed key material supplied by the caller.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transient failures that a caller may retry with backoff.
    ///
    /// Crypto failures are deterministic and `Rejected`/`UnknownTransaction`
    /// are terminal, so none of those qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::CredentialUnavailable(_)
                | Error::TransportFailure(_)
                | Error::FetchError(_)
                | Error::Timeout { .. }
        )
    }
}
