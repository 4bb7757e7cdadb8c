//! # Submission Client and Ledger adapter
//!
//! The Ledger is the service of record. This module holds:
//!
//! - the [`Ledger`] trait and its JSON/HTTP implementation [`HttpLedger`];
//! - the [`SubmissionRecord`] bundle and its stable `record_id`;
//! - [`SubmissionClient`], which turns the Ledger's answer into a
//!   [`SubmissionOutcome`] the caller can branch on.
//!
//! A rejection is final for that record. A transport failure leaves the
//! record's fate unknown, so the same record (same `record_id`) may be resent
//! and the Ledger can deduplicate it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{
    endpoint, LEDGER_ACTIONS_PATH, LEDGER_PENDING_PATH, LEDGER_RECEIVE_PATH, LEDGER_REJECT_PATH,
    RECORD_ID_DOMAIN,
};
use crate::credential::Credential;
use crate::crypto::{blake3_hash_multi, ActionSignature, EncryptedAction, PrincipalPublicKey};
use crate::error::Error;
use crate::transport::HttpTransport;

// ---------------------------------------------------------------------------
// Records and outcomes
// ---------------------------------------------------------------------------

/// Everything the Ledger needs to accept one action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub encrypted_action: EncryptedAction,
    pub credential: Credential,
    pub signature: ActionSignature,
    pub signer: PrincipalPublicKey,
}

impl SubmissionRecord {
    pub fn new(
        encrypted_action: EncryptedAction,
        credential: Credential,
        signature: ActionSignature,
        signer: PrincipalPublicKey,
    ) -> Self {
        Self {
            encrypted_action,
            credential,
            signature,
            signer,
        }
    }

    /// Content address of the record, hex encoded.
    ///
    /// Every field takes part, so a resend of the same record carries the
    /// same id and any change produces a different one.
    pub fn record_id(&self) -> String {
        let digest = blake3_hash_multi(&[
            RECORD_ID_DOMAIN,
            &self.encrypted_action.kem_ciphertext,
            &self.encrypted_action.nonce,
            &self.encrypted_action.ciphertext,
            self.credential.as_str().as_bytes(),
            self.signature.as_bytes(),
            &self.signer.verifying_key,
            self.signer.encapsulation_key.as_bytes(),
        ]);
        hex::encode(digest)
    }
}

/// Why the Ledger refused a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectReason {
    InvalidCredential,
    InvalidSignature,
    MalformedCiphertext,
    /// Any reason code this client does not model.
    Other(String),
}

impl RejectReason {
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_credential" => RejectReason::InvalidCredential,
            "invalid_signature" => RejectReason::InvalidSignature,
            "malformed_ciphertext" => RejectReason::MalformedCiphertext,
            other => RejectReason::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            RejectReason::InvalidCredential => "invalid_credential",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::MalformedCiphertext => "malformed_ciphertext",
            RejectReason::Other(code) => code,
        }
    }
}

impl From<String> for RejectReason {
    fn from(code: String) -> Self {
        RejectReason::from_code(&code)
    }
}

impl From<RejectReason> for String {
    fn from(reason: RejectReason) -> Self {
        reason.code().to_string()
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Proof that the Ledger took the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub receipt_id: String,
    pub record_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Result of one submission attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted(SubmissionReceipt),
    /// Terminal. Never retried automatically.
    Rejected(RejectReason),
    /// The record may or may not have landed.
    TransportFailure(String),
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted(_))
    }

    pub fn into_result(self) -> Result<SubmissionReceipt, Error> {
        match self {
            SubmissionOutcome::Accepted(receipt) => Ok(receipt),
            SubmissionOutcome::Rejected(reason) => Err(Error::Rejected(reason)),
            SubmissionOutcome::TransportFailure(msg) => Err(Error::TransportFailure(msg)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pending transactions
// ---------------------------------------------------------------------------

/// A transaction addressed to the principal and waiting for acknowledgement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
}

/// The Ledger's answer to a receive or a reject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The service of record.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn submit_record(&self, record: &SubmissionRecord) -> SubmissionOutcome;

    /// Fails only with `FetchError`.
    async fn pending_transactions(&self, receiver: &str)
        -> Result<Vec<PendingTransaction>, Error>;

    /// Fails with `UnknownTransaction` or `TransportFailure`.
    async fn receive_transaction(&self, transaction_id: &str) -> Result<Ack, Error>;

    /// Decline a pending transaction. Same failure modes as a receive.
    async fn reject_transaction(&self, transaction_id: &str) -> Result<Ack, Error>;
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    record_id: String,
    #[serde(flatten)]
    record: &'a SubmissionRecord,
}

#[derive(Deserialize)]
struct SubmitAccepted {
    receipt_id: String,
    #[serde(default)]
    accepted_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SubmitRejected {
    reason: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Serialize)]
struct SettleBody<'a> {
    #[serde(rename = "transactionId")]
    transaction_id: &'a str,
}

/// [`Ledger`] over JSON/HTTP.
#[derive(Clone, Debug)]
pub struct HttpLedger {
    base_url: String,
    transport: HttpTransport,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>, transport: HttpTransport) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
        }
    }

    /// Shared by receive and reject: both post `{transactionId}` and answer
    /// with an [`Ack`].
    async fn settle(&self, path: &str, transaction_id: &str) -> Result<Ack, Error> {
        let url = endpoint(&self.base_url, path);
        let body = SettleBody { transaction_id };
        let reply = self
            .transport
            .send(self.transport.post(&url).json(&body))
            .await
            .map_err(|err| Error::TransportFailure(err.to_string()))?;

        match reply.status {
            200..=299 => reply
                .json()
                .map_err(|err| Error::TransportFailure(format!("malformed ack: {err}"))),
            404 | 409 | 410 => Err(Error::UnknownTransaction(transaction_id.to_string())),
            status => Err(Error::TransportFailure(format!("ledger answered HTTP {status}"))),
        }
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn submit_record(&self, record: &SubmissionRecord) -> SubmissionOutcome {
        let record_id = record.record_id();
        let url = endpoint(&self.base_url, LEDGER_ACTIONS_PATH);
        let body = SubmitBody {
            record_id: record_id.clone(),
            record,
        };

        let reply = match self.transport.send(self.transport.post(&url).json(&body)).await {
            Ok(reply) => reply,
            Err(err) => return SubmissionOutcome::TransportFailure(err.to_string()),
        };

        if reply.is_success() {
            return match reply.json::<SubmitAccepted>() {
                Ok(accepted) => SubmissionOutcome::Accepted(SubmissionReceipt {
                    receipt_id: accepted.receipt_id,
                    record_id,
                    accepted_at: accepted.accepted_at.unwrap_or_else(Utc::now),
                }),
                Err(err) => SubmissionOutcome::TransportFailure(format!(
                    "HTTP {} with unreadable receipt: {err}",
                    reply.status
                )),
            };
        }
        if reply.is_transient() || !(400..500).contains(&reply.status) {
            return SubmissionOutcome::TransportFailure(format!("ledger answered HTTP {}", reply.status));
        }

        let reason = match reply.json::<SubmitRejected>() {
            Ok(rejected) => {
                if let Some(detail) = rejected.detail {
                    tracing::debug!(%record_id, reason = %rejected.reason, %detail, "rejection detail");
                }
                RejectReason::from_code(&rejected.reason)
            }
            Err(_) => RejectReason::Other(format!("HTTP {}", reply.status)),
        };
        SubmissionOutcome::Rejected(reason)
    }

    async fn pending_transactions(
        &self,
        receiver: &str,
    ) -> Result<Vec<PendingTransaction>, Error> {
        let url = endpoint(&self.base_url, LEDGER_PENDING_PATH);
        let request = self.transport.get(&url).query(&[("receiver", receiver)]);
        let reply = self
            .transport
            .send(request)
            .await
            .map_err(|err| Error::FetchError(err.to_string()))?;

        if !reply.is_success() {
            return Err(Error::FetchError(format!("ledger answered HTTP {}", reply.status)));
        }
        reply
            .json()
            .map_err(|err| Error::FetchError(format!("malformed pending list: {err}")))
    }

    async fn receive_transaction(&self, transaction_id: &str) -> Result<Ack, Error> {
        self.settle(LEDGER_RECEIVE_PATH, transaction_id).await
    }

    async fn reject_transaction(&self, transaction_id: &str) -> Result<Ack, Error> {
        self.settle(LEDGER_REJECT_PATH, transaction_id).await
    }}

// ---------------------------------------------------------------------------
// Submission Client
// ---------------------------------------------------------------------------

/// Sends sealed, signed, credentialed actions to the Ledger.
#[derive(Clone)]
pub struct SubmissionClient {
    ledger: Arc<dyn Ledger>,
}

impl SubmissionClient {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn submit(
        &self,
        encrypted_action: EncryptedAction,
        credential: Credential,
        signature: ActionSignature,
        signer: PrincipalPublicKey,
    ) -> SubmissionOutcome {
        let record = SubmissionRecord::new(encrypted_action, credential, signature, signer);
        self.submit_record(&record).await
    }

    /// Send an already assembled record. Resending the same record is safe.
    pub async fn submit_record(&self, record: &SubmissionRecord) -> SubmissionOutcome {
        let outcome = self.ledger.submit_record(record).await;
        match &outcome {
            SubmissionOutcome::Accepted(receipt) => tracing::info!(
                record_id = %receipt.record_id,
                receipt_id = %receipt.receipt_id,
                "submission accepted"
            ),
            SubmissionOutcome::Rejected(reason) => {
                tracing::warn!(record_id = %record.record_id(), %reason, "submission rejected")
            }
            SubmissionOutcome::TransportFailure(msg) => {
                tracing::warn!(record_id = %record.record_id(), error = %msg, "submission transport failure")
            }
        }
        outcome
    }
}

impl fmt::Debug for SubmissionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::crypto::{KemSecretKey, PrincipalKeys};
    use crate::encoder::ActionEncoder;
    use mockito::Matcher;
    use std::time::Duration;

    fn record() -> SubmissionRecord {
        let (_, ledger_pk) = KemSecretKey::generate(&mut rand::rngs::OsRng);
        let keys = PrincipalKeys::generate().unwrap();
        let encoded = ActionEncoder::for_service(ledger_pk)
            .encode(&Action::from("transfer:100"), &keys)
            .unwrap();
        SubmissionRecord::new(
            encoded.encrypted_action,
            Credential::new("cred-1"),
            encoded.signature,
            encoded.signer,
        )
    }

    fn client(url: String) -> SubmissionClient {
        let transport = HttpTransport::new(Duration::from_secs(5));
        SubmissionClient::new(Arc::new(HttpLedger::new(url, transport)))
    }

    #[test]
    fn test_record_id_is_stable_and_content_bound() {
        let record = record();
        assert_eq!(record.record_id(), record.clone().record_id());

        let mut other = record.clone();
        other.credential = Credential::new("cred-2");
        assert_ne!(record.record_id(), other.record_id());
    }

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::from_code("invalid_signature"), RejectReason::InvalidSignature);
        assert_eq!(
            RejectReason::from_code("quota_exceeded"),
            RejectReason::Other("quota_exceeded".into())
        );
        assert_eq!(RejectReason::InvalidCredential.to_string(), "invalid_credential");
    }

    #[test]
    fn test_pending_transaction_wire_names() {
        let json = r#"[{"transactionId":"tx-1","sender":"bob","receiver":"alice","amount":12.5}]"#;
        let parsed: Vec<PendingTransaction> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].transaction_id, "tx-1");
        assert_eq!(parsed[0].amount, 12.5);
    }

    #[tokio::test]
    async fn test_accepted_submission_forwards_credential_verbatim() {
        let record = record();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/actions")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "record_id": record.record_id(),
                "credential": "cred-1",
                "signature": record.signature.to_hex(),
            })))
            .with_status(201)
            .with_body(r#"{"receipt_id": "rcpt-9", "accepted_at": "2026-03-01T12:00:00Z"}"#)
            .create_async()
            .await;

        let outcome = client(server.url()).submit_record(&record).await;
        mock.assert_async().await;

        let receipt = outcome.into_result().unwrap();
        assert_eq!(receipt.receipt_id, "rcpt-9");
        assert_eq!(receipt.record_id, record.record_id());
        assert_eq!(receipt.accepted_at.to_rfc3339(), "2026-03-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_rejection_carries_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/actions")
            .with_status(422)
            .with_body(r#"{"reason": "invalid_credential", "detail": "expired"}"#)
            .create_async()
            .await;

        let outcome = client(server.url()).submit_record(&record()).await;
        assert_eq!(outcome, SubmissionOutcome::Rejected(RejectReason::InvalidCredential));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/actions")
            .with_status(502)
            .create_async()
            .await;

        let outcome = client(server.url()).submit_record(&record()).await;
        assert!(matches!(outcome, SubmissionOutcome::TransportFailure(_)));
        assert!(outcome.into_result().unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_pending_and_receive() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pending_transactions")
            .match_query(Matcher::UrlEncoded("receiver".into(), "alice".into()))
            .with_status(200)
            .with_body(r#"[{"transactionId":"tx-1","sender":"bob","receiver":"alice","amount":3}]"#)
            .create_async()
            .await;
        server
            .mock("POST", "/receive_transaction")
            .match_body(Matcher::Json(serde_json::json!({"transactionId": "tx-1"})))
            .with_status(200)
            .with_body(r#"{"transactionId":"tx-1","status":"received"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/receive_transaction")
            .match_body(Matcher::Json(serde_json::json!({"transactionId": "tx-gone"})))
            .with_status(410)
            .create_async()
            .await;

        let ledger = HttpLedger::new(server.url(), HttpTransport::new(Duration::from_secs(5)));
        let pending = ledger.pending_transactions("alice").await.unwrap();
        assert_eq!(pending.len(), 1);

        let ack = ledger.receive_transaction("tx-1").await.unwrap();
        assert_eq!(ack.status, "received");

        let err = ledger.receive_transaction("tx-gone").await.unwrap_err();
        assert!(matches!(err, Error::UnknownTransaction(id) if id == "tx-gone"));
    }

    #[tokio::test]
    async fn test_reject_posts_to_its_own_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let reject = server
            .mock("POST", "/reject_transaction")
            .match_body(Matcher::Json(serde_json::json!({"transactionId": "tx-1"})))
            .with_status(200)
            .with_body(r#"{"transactionId":"tx-1","status":"rejected"}"#)
            .create_async()
            .await;
        let receive = server
            .mock("POST", "/receive_transaction")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("POST", "/reject_transaction")
            .match_body(Matcher::Json(serde_json::json!({"transactionId": "tx-taken"})))
            .with_status(409)
            .create_async()
            .await;

        let ledger = HttpLedger::new(server.url(), HttpTransport::new(Duration::from_secs(5)));
        let ack = ledger.reject_transaction("tx-1").await.unwrap();
        assert_eq!(ack.status, "rejected");

        let err = ledger.reject_transaction("tx-taken").await.unwrap_err();
        assert!(matches!(err, Error::UnknownTransaction(id) if id == "tx-taken"));

        reject.assert_async().await;
        receive.assert_async().await;
    }

    #[tokio::test]
    async fn test_pending_fetch_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pending_transactions")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let ledger = HttpLedger::new(server.url(), HttpTransport::new(Duration::from_secs(5)));
        assert!(matches!(
            ledger.pending_transactions("alice").await,
            Err(Error::FetchError(_))
        ));
    }
}
