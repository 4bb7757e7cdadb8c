//! End-to-end tests for the Civitas client against fake Issuer and Ledger
//! HTTP services.
//!
//! Every test owns its own `mockito` server, so the exact set of HTTP
//! requests each flow sends is asserted, not just its return value.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use civitas_protocol::crypto::{open_action, KemPublicKey, KemSecretKey};
use civitas_protocol::{
    verify_action_signature, Action, ActionClient, ActionEncoder, ClientConfig, EncryptionError,
    Error, HttpIssuer, HttpLedger, HttpTransport, Ledger, PendingReconciler, PrincipalSession,
    SubmissionRecord, TransactionState,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn ledger_keys() -> (KemSecretKey, KemPublicKey) {
    KemSecretKey::generate(&mut rand::rngs::OsRng)
}

fn transport() -> HttpTransport {
    HttpTransport::new(Duration::from_secs(5))
}

fn session(principal: &str) -> PrincipalSession {
    let session = PrincipalSession::new(principal);
    session.generate_keypair().expect("keygen");
    session
}

fn client(server: &ServerGuard, ledger_key: KemPublicKey) -> ActionClient {
    let config = ClientConfig {
        issuer_url: server.url(),
        ledger_url: server.url(),
        request_timeout_ms: 5_000,
        max_retries: 0,
    };
    ActionClient::from_config(&config, ledger_key).expect("valid config")
}

fn reconciler(server: &ServerGuard, principal: &str) -> PendingReconciler {
    let ledger: Arc<dyn Ledger> = Arc::new(HttpLedger::new(server.url(), transport()));
    PendingReconciler::new(principal, ledger)
}

fn pending_body(ids: &[&str]) -> String {
    let txs: Vec<_> = ids
        .iter()
        .map(|id| json!({"transactionId": id, "sender": "bob", "receiver": "alice", "amount": 25.0}))
        .collect();
    serde_json::to_string(&txs).unwrap()
}

async fn mock_pending(server: &mut Server, ids: &[&str]) -> mockito::Mock {
    server
        .mock("GET", "/pending_transactions")
        .match_query(Matcher::UrlEncoded("receiver".into(), "alice".into()))
        .with_status(200)
        .with_body(pending_body(ids))
        .create_async()
        .await
}

async fn mock_receive(server: &mut Server, id: &str, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/receive_transaction")
        .match_body(Matcher::Json(json!({"transactionId": id})))
        .with_status(200)
        .with_body(json!({"transactionId": id, "status": "received"}).to_string())
        .expect(hits)
        .create_async()
        .await
}

async fn mock_reject(server: &mut Server, id: &str, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/reject_transaction")
        .match_body(Matcher::Json(json!({"transactionId": id})))
        .with_status(200)
        .with_body(json!({"transactionId": id, "status": "rejected"}).to_string())
        .expect(hits)
        .create_async()
        .await
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_generate_credential_encode_submit_is_accepted() {
    let (_, ledger_pk) = ledger_keys();
    let mut server = Server::new_async().await;

    let issuer = server
        .mock("POST", "/credentials")
        .match_body(Matcher::PartialJson(json!({
            "principal_id": "alice",
            "action": {"kind": "transfer"}
        })))
        .with_status(200)
        .with_body(r#"{"credential": "issuer-token-1"}"#)
        .expect(1)
        .create_async()
        .await;
    let ledger = server
        .mock("POST", "/actions")
        .match_body(Matcher::PartialJson(json!({"credential": "issuer-token-1"})))
        .with_status(202)
        .with_body(r#"{"receipt_id": "rcpt-100"}"#)
        .expect(1)
        .create_async()
        .await;

    let alice = session("alice");
    let receipt = client(&server, ledger_pk)
        .submit_action(&alice, Action::from("transfer:100"))
        .await
        .expect("accepted");

    issuer.assert_async().await;
    ledger.assert_async().await;
    assert_eq!(receipt.receipt_id, "rcpt-100");
    assert_eq!(receipt.record_id.len(), 64);
}

#[tokio::test]
async fn test_submitted_record_opens_and_verifies() {
    let (ledger_sk, ledger_pk) = ledger_keys();
    let alice = session("alice");
    let keys = alice.keys().unwrap();
    let action = Action::from("transfer:100");

    let encoded = ActionEncoder::for_service(ledger_pk)
        .encode(&action, &keys)
        .unwrap();
    let record = SubmissionRecord::new(
        encoded.encrypted_action,
        civitas_protocol::Credential::new("issuer-token-1"),
        encoded.signature,
        encoded.signer,
    );

    // What crosses the wire decodes back to the same record.
    let wire = serde_json::to_string(&record).unwrap();
    let received: SubmissionRecord = serde_json::from_str(&wire).unwrap();
    assert_eq!(received.record_id(), record.record_id());

    let plaintext = open_action(&ledger_sk, &received.encrypted_action).unwrap();
    assert_eq!(plaintext, action.as_bytes());
    assert!(verify_action_signature(
        &Action::new(plaintext),
        &received.signature,
        &received.signer
    ));
}

#[tokio::test]
async fn test_denied_credential_never_reaches_ledger() {
    let (_, ledger_pk) = ledger_keys();
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/credentials")
        .with_status(403)
        .with_body(r#"{"reason": "action kind not allowed"}"#)
        .create_async()
        .await;
    let ledger = server
        .mock("POST", "/actions")
        .expect(0)
        .create_async()
        .await;

    let err = client(&server, ledger_pk)
        .submit_action(&session("alice"), Action::from("mint:1000000"))
        .await
        .unwrap_err();

    ledger.assert_async().await;
    assert!(matches!(err, Error::CredentialDenied { reason } if reason == "action kind not allowed"));
}

#[tokio::test]
async fn test_ledger_rejection_is_terminal() {
    let (_, ledger_pk) = ledger_keys();
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/credentials")
        .with_status(200)
        .with_body(r#"{"credential": "stale"}"#)
        .create_async()
        .await;
    let ledger = server
        .mock("POST", "/actions")
        .with_status(401)
        .with_body(r#"{"reason": "invalid_credential"}"#)
        .expect(1)
        .create_async()
        .await;

    let err = client(&server, ledger_pk)
        .submit_action(&session("alice"), Action::from("transfer:1"))
        .await
        .unwrap_err();

    ledger.assert_async().await;
    assert!(matches!(
        err,
        Error::Rejected(civitas_protocol::RejectReason::InvalidCredential)
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_oversized_action_fails_before_any_submission() {
    let (_, ledger_pk) = ledger_keys();
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/credentials")
        .with_status(200)
        .with_body(r#"{"credential": "ok"}"#)
        .create_async()
        .await;
    let ledger = server
        .mock("POST", "/actions")
        .expect(0)
        .create_async()
        .await;

    let huge = Action::new(vec![b'z'; civitas_protocol::config::MAX_ACTION_LENGTH + 1]);
    let err = client(&server, ledger_pk)
        .submit_action(&session("alice"), huge)
        .await
        .unwrap_err();

    ledger.assert_async().await;
    assert!(matches!(
        err,
        Error::Encryption(EncryptionError::PlaintextTooLarge { .. })
    ));
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_receive_unknown_id_leaves_pending_set_unchanged() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-1", "tx-2"]).await;
    let receive = server
        .mock("POST", "/receive_transaction")
        .expect(0)
        .create_async()
        .await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();
    let before = r.pending();

    let err = r.receive("tx-42").await.unwrap_err();
    assert!(matches!(err, Error::UnknownTransaction(id) if id == "tx-42"));
    assert_eq!(r.pending(), before);
    receive.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_receive_sends_one_request() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-7"]).await;
    let receive = mock_receive(&mut server, "tx-7", 1).await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();

    let (first, second) = tokio::join!(r.receive("tx-7"), r.receive("tx-7"));

    receive.assert_async().await;
    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::ReceiveInFlight(id)) if id == "tx-7"));
    assert_eq!(r.state_of("tx-7"), TransactionState::Removed);
}

#[tokio::test]
async fn test_receive_is_idempotent_in_effect() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-1"]).await;
    let receive = mock_receive(&mut server, "tx-1", 1).await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();

    r.receive("tx-1").await.unwrap();
    assert!(matches!(
        r.receive("tx-1").await,
        Err(Error::UnknownTransaction(_))
    ));
    receive.assert_async().await;
}

#[tokio::test]
async fn test_fetch_receive_all_then_fetch_is_empty() {
    let mut server = Server::new_async().await;
    let first_listing = mock_pending(&mut server, &["tx-1", "tx-2", "tx-3"]).await;
    for id in ["tx-1", "tx-2", "tx-3"] {
        mock_receive(&mut server, id, 1).await;
    }

    let r = reconciler(&server, "alice");
    let pending = r.fetch_pending().await.unwrap();
    assert_eq!(pending.len(), 3);
    for tx in &pending {
        r.receive(&tx.transaction_id).await.unwrap();
    }

    // The Ledger has caught up and lists nothing.
    first_listing.remove_async().await;
    mock_pending(&mut server, &[]).await;
    assert!(r.fetch_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lagging_ledger_listing_is_filtered() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-1", "tx-2"]).await;
    mock_receive(&mut server, "tx-1", 1).await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();
    r.receive("tx-1").await.unwrap();

    // Same listing again: tx-1 was acknowledged here, so it stays gone.
    let refreshed = r.fetch_pending().await.unwrap();
    let ids: Vec<_> = refreshed.iter().map(|tx| tx.transaction_id.as_str()).collect();
    assert_eq!(ids, ["tx-2"]);
}

#[tokio::test]
async fn test_failed_receive_keeps_transaction_pending() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-9"]).await;
    server
        .mock("POST", "/receive_transaction")
        .with_status(503)
        .create_async()
        .await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();

    let err = r.receive("tx-9").await.unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
    assert_eq!(r.state_of("tx-9"), TransactionState::Pending);
    assert_eq!(r.pending().len(), 1);
}

#[tokio::test]
async fn test_already_claimed_elsewhere_is_unknown() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-5"]).await;
    server
        .mock("POST", "/receive_transaction")
        .with_status(409)
        .with_body(r#"{"reason": "already received"}"#)
        .create_async()
        .await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();

    let err = r.receive("tx-5").await.unwrap_err();
    assert!(matches!(err, Error::UnknownTransaction(id) if id == "tx-5"));
    assert_eq!(r.state_of("tx-5"), TransactionState::Pending);
}

#[tokio::test]
async fn test_reject_removes_transaction() {
    let mut server = Server::new_async().await;
    let listing = mock_pending(&mut server, &["tx-1", "tx-2"]).await;
    let reject = mock_reject(&mut server, "tx-1", 1).await;
    let receive = server
        .mock("POST", "/receive_transaction")
        .expect(0)
        .create_async()
        .await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();

    let ack = r.reject("tx-1").await.unwrap();
    assert_eq!(ack.status, "rejected");
    assert_eq!(r.state_of("tx-1"), TransactionState::Removed);

    listing.remove_async().await;
    mock_pending(&mut server, &["tx-2"]).await;
    let refreshed = r.fetch_pending().await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].transaction_id, "tx-2");

    reject.assert_async().await;
    receive.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_receive_and_reject_send_one_request() {
    let mut server = Server::new_async().await;
    mock_pending(&mut server, &["tx-7"]).await;
    let receive = mock_receive(&mut server, "tx-7", 1).await;
    let reject = mock_reject(&mut server, "tx-7", 0).await;

    let r = reconciler(&server, "alice");
    r.fetch_pending().await.unwrap();

    let (received, rejected) = tokio::join!(r.receive("tx-7"), r.reject("tx-7"));

    receive.assert_async().await;
    reject.assert_async().await;
    assert!(received.is_ok());
    assert!(matches!(rejected, Err(Error::ReceiveInFlight(id)) if id == "tx-7"));
    assert_eq!(r.state_of("tx-7"), TransactionState::Removed);
}

#[tokio::test]
async fn test_issuer_and_ledger_can_live_apart() {
    let (_, ledger_pk) = ledger_keys();
    let mut issuer_server = Server::new_async().await;
    let mut ledger_server = Server::new_async().await;

    issuer_server
        .mock("POST", "/credentials")
        .with_status(200)
        .with_body(r#"{"credential": "c"}"#)
        .create_async()
        .await;
    ledger_server
        .mock("POST", "/actions")
        .with_status(200)
        .with_body(r#"{"receipt_id": "r"}"#)
        .create_async()
        .await;

    let client = ActionClient::new(
        Arc::new(HttpIssuer::new(issuer_server.url(), transport())),
        Arc::new(HttpLedger::new(ledger_server.url(), transport())),
        ActionEncoder::for_service(ledger_pk),
    );
    let receipt = client
        .submit_action(&session("alice"), Action::from("vote:yes"))
        .await
        .unwrap();
    assert_eq!(receipt.receipt_id, "r");
}
