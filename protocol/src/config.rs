//! # Protocol Configuration & Constants
//!
//! Every magic number in Civitas lives here, next to the runtime
//! [`ClientConfig`] that tells a client where its Issuer and Ledger live.
//!
//! The constants define the wire contract with the Ledger. Changing a label
//! or a size limit after deployment means every sealed record in flight
//! becomes unreadable, so bump the labels' `v1` suffix and
//! [`PROTOCOL_VERSION`] together when you do.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Wire protocol version, reported by `civitas version`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// User-Agent header value for every outbound request. Carries the crate
/// version, not [`PROTOCOL_VERSION`].
pub const USER_AGENT: &str = concat!("civitas-protocol/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Signature scheme used for action authorship.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Lattice KEM used to reach the decrypting party.
pub const KEM_ALGORITHM: &str = "ML-KEM-768";

/// Symmetric AEAD that carries the action body under the KEM secret.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// Ed25519 verifying key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// ML-KEM-768 encapsulation (public) key length in bytes.
pub const KEM_PUBLIC_KEY_LENGTH: usize = 1184;

/// ML-KEM-768 ciphertext length in bytes.
pub const KEM_CIPHERTEXT_LENGTH: usize = 1088;

/// Seed length for a principal keypair: 32 bytes for Ed25519, 32 for the
/// ML-KEM key generator.
pub const PRINCIPAL_SEED_LENGTH: usize = 64;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Always twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Largest action a single encode will seal. Actions are sealed as one
/// block; there is no chunking, and anything longer is an error rather than
/// a silent truncation.
pub const MAX_ACTION_LENGTH: usize = 4096;

/// BLAKE3 key-derivation context for the AEAD key.
pub const KEM_KDF_CONTEXT: &str = "civitas 2026-01 action-seal v1 aes-256-gcm key";

/// AAD bound into every sealed action.
pub const ACTION_SEAL_AAD: &[u8] = b"civitas/action-seal/v1";

/// Domain-separation prefix for action signatures. Keeps a signature over
/// an action from ever validating as a signature over something else.
pub const ACTION_SIGNING_DOMAIN: &[u8] = b"civitas/action-signature/v1";

/// Domain-separation prefix for submission record ids.
pub const RECORD_ID_DOMAIN: &[u8] = b"civitas/submission-record/v1";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Issuer: credential request.
pub const ISSUER_CREDENTIALS_PATH: &str = "/credentials";

/// Ledger: action intake.
pub const LEDGER_ACTIONS_PATH: &str = "/actions";

/// Ledger: transactions awaiting acknowledgement by a receiver.
pub const LEDGER_PENDING_PATH: &str = "/pending_transactions";

/// Ledger: acknowledge a pending transaction.
pub const LEDGER_RECEIVE_PATH: &str = "/receive_transaction";

/// Ledger: decline a pending transaction.
pub const LEDGER_REJECT_PATH: &str = "/reject_transaction";

// ---------------------------------------------------------------------------
// Timing & Retry
// ---------------------------------------------------------------------------

/// Default per-request timeout. Network calls are never allowed to hang a
/// UI event loop indefinitely.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shortest backoff delay when the caller opts in to retries.
pub const RETRY_MIN_DELAY: Duration = Duration::from_millis(200);

/// Longest backoff delay when the caller opts in to retries.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Capacity of the reconciler's event channel. Slow subscribers lag and
/// miss events; they never block the reconciler.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default Issuer base URL for local development.
pub const DEFAULT_ISSUER_URL: &str = "http://127.0.0.1:5001";

/// Default Ledger base URL for local development.
pub const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8000";

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Where a client finds its collaborators and how patient it is with them.
///
/// Deserializable from JSON so a deployment can ship a config file; every
/// field has a default, so `{}` is a valid (local development) config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the credential Issuer.
    pub issuer_url: String,
    /// Base URL of the Ledger.
    pub ledger_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Retries for transient failures. Zero means the core never retries.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            issuer_url: DEFAULT_ISSUER_URL.to_string(),
            ledger_url: DEFAULT_LEDGER_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            max_retries: 0,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON config document and validate it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that could never work: non-HTTP URLs and a zero timeout.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, url) in [("issuer_url", &self.issuer_url), ("ledger_url", &self.ledger_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("{name} must be an http(s) URL, got {url:?}")));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// The per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Join a base URL and an endpoint path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            ClientConfig::from_json(r#"{"ledger_url": "https://ledger.example", "max_retries": 3}"#)
                .unwrap();
        assert_eq!(config.ledger_url, "https://ledger.example");
        assert_eq!(config.issuer_url, DEFAULT_ISSUER_URL);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = ClientConfig::from_json(r#"{"issuer_url": "ftp://issuer"}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = ClientConfig::from_json(r#"{"request_timeout_ms": 0}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(endpoint("http://a:1/", "/actions"), "http://a:1/actions");
        assert_eq!(endpoint("http://a:1", "/actions"), "http://a:1/actions");
    }

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(VERIFYING_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(PRINCIPAL_SEED_LENGTH, 64);
    }

    #[test]
    fn test_user_agent_names_the_crate() {
        assert!(USER_AGENT.starts_with("civitas-protocol/"));
    }
}
