// Copyright (c) 2026 Civitas Contributors. MIT License.
// See LICENSE for details.

//! # Civitas Protocol: Client Library
//!
//! The client half of credentialed, confidential action submission. A
//! principal proves an Issuer authorized an action, seals the action so
//! only the Ledger can read it, signs the plaintext so authorship is
//! provable, and submits the bundle. Separately, it pulls transactions
//! addressed to it and acknowledges them one at a time.
//!
//! ML-KEM-768 (a lattice KEM) carries the per-action AES-256-GCM key;
//! Ed25519 signs. Everything the wire sees is hex in JSON.
//!
//! ## Architecture
//!
//! - **session**: Key Manager. Owns the principal's keypair and its epoch.
//! - **credential**: Credential Requester and the `Issuer` seam.
//! - **encoder**: Action Encoder: seal to the decrypting party, sign the plaintext.
//! - **submission**: Submission Client, `Ledger` seam, records and outcomes.
//! - **reconciler**: Pending Transaction Reconciler with its local state machine.
//! - **client**: `ActionClient`, the whole submission protocol in one call.
//! - **crypto**: Typed wrappers over the primitives.
//! - **transport** / **retry**: HTTP defaults and opt-in backoff.
//! - **config**: Protocol constants and runtime `ClientConfig`.
//!
//! ## Quick look
//!
//! ```no_run
//! use civitas_protocol::{Action, ActionClient, ClientConfig, KemPublicKey, PrincipalSession};
//!
//! # async fn demo(ledger_key: KemPublicKey) -> Result<(), civitas_protocol::Error> {
//! let session = PrincipalSession::new("alice");
//! session.generate_keypair()?;
//!
//! let client = ActionClient::from_config(&ClientConfig::default(), ledger_key)?;
//! let receipt = client.submit_action(&session, Action::from("transfer:100")).await?;
//! println!("accepted as {}", receipt.receipt_id);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod client;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod encoder;
pub mod error;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod submission;
pub mod transport;

pub use action::{Action, ActionDescriptor};
pub use client::ActionClient;
pub use config::ClientConfig;
pub use credential::{Credential, CredentialRequest, CredentialRequester, HttpIssuer, Issuer};
pub use crypto::{
    ActionSignature, EncryptedAction, EncryptionError, KemPublicKey, KemSecretKey,
    KeyGenerationError, PrincipalKeys, PrincipalPublicKey, SigningError,
};
pub use encoder::{verify_action_signature, ActionEncoder, EncodedAction, EncryptionTarget};
pub use error::Error;
pub use reconciler::{PendingReconciler, ReconcilerEvent, TransactionState};
pub use retry::RetryPolicy;
pub use session::PrincipalSession;
pub use submission::{
    Ack, HttpLedger, Ledger, PendingTransaction, RejectReason, SubmissionClient,
    SubmissionOutcome, SubmissionReceipt, SubmissionRecord,
};
pub use transport::HttpTransport;
