//! # Action Client
//!
//! Runs the full submission protocol for one action:
//!
//! 1. pin the session's current keys and epoch,
//! 2. obtain a credential from the Issuer,
//! 3. seal and sign the action,
//! 4. make sure the keys were not replaced in the meantime,
//! 5. hand the record to the Ledger.
//!
//! Every network step is bounded by the request timeout. Retrying is opt-in
//! through [`RetryPolicy`]; a submission retry resends the identical record,
//! never a fresh encoding.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::action::Action;
use crate::config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::credential::{CredentialRequest, CredentialRequester, HttpIssuer, Issuer};
use crate::crypto::KemPublicKey;
use crate::encoder::ActionEncoder;
use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::session::PrincipalSession;
use crate::submission::{HttpLedger, Ledger, SubmissionClient, SubmissionReceipt, SubmissionRecord};
use crate::transport::HttpTransport;

pub struct ActionClient {
    credentials: CredentialRequester,
    encoder: ActionEncoder,
    submissions: SubmissionClient,
    ledger: Arc<dyn Ledger>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ActionClient {
    pub fn new(issuer: Arc<dyn Issuer>, ledger: Arc<dyn Ledger>, encoder: ActionEncoder) -> Self {
        Self {
            credentials: CredentialRequester::new(issuer),
            encoder,
            submissions: SubmissionClient::new(Arc::clone(&ledger)),
            ledger,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::none(),
        }
    }

    /// HTTP client for the Issuer and Ledger in `config`, sealing actions to
    /// the Ledger's `ledger_key`.
    pub fn from_config(config: &ClientConfig, ledger_key: KemPublicKey) -> Result<Self, Error> {
        config.validate()?;
        let transport = HttpTransport::new(config.request_timeout());
        let issuer = Arc::new(HttpIssuer::new(config.issuer_url.clone(), transport.clone()));
        let ledger = Arc::new(HttpLedger::new(config.ledger_url.clone(), transport));

        let retry = match config.max_retries {
            0 => RetryPolicy::none(),
            n => RetryPolicy::exponential(n as usize),
        };
        Ok(Self::new(issuer, ledger, ActionEncoder::for_service(ledger_key))
            .with_timeout(config.request_timeout())
            .with_retry(retry))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The Ledger this client submits to, for building a reconciler.
    pub fn ledger(&self) -> Arc<dyn Ledger> {
        Arc::clone(&self.ledger)
    }

    pub fn encoder(&self) -> &ActionEncoder {
        &self.encoder
    }

    /// Run the whole protocol for `action` on behalf of `session`.
    pub async fn submit_action(
        &self,
        session: &PrincipalSession,
        action: Action,
    ) -> Result<SubmissionReceipt, Error> {
        let (keys, epoch) = session.snapshot()?;
        let request = CredentialRequest::new(session.principal_id(), &keys.public_key(), &action);

        let request = &request;
        let timeout_ms = self.timeout_ms();
        let credential = self
            .retry
            .run("credential request", move || async move {
                tokio::time::timeout(self.timeout, self.credentials.send(request))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::CredentialUnavailable(format!(
                            "issuer did not answer within {timeout_ms}ms"
                        )))
                    })
            })
            .await?;

        let encoded = self.encoder.encode(&action, &keys)?;

        let current = session.epoch();
        if current != epoch {
            tracing::warn!(
                principal = %session.principal_id(),
                expected = epoch,
                current,
                "keys replaced while preparing action; not submitting"
            );
            return Err(Error::KeysRotated {
                expected: epoch,
                current,
            });
        }

        let record = SubmissionRecord::new(
            encoded.encrypted_action,
            credential,
            encoded.signature,
            encoded.signer,
        );
        let record = &record;
        self.retry
            .run("submission", move || {
                self.bounded("submission", async move {
                    self.submissions.submit_record(record).await.into_result()
                })
            })
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| Error::Timeout {
                operation,
                timeout_ms: self.timeout_ms(),
            })?
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl std::fmt::Debug for ActionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionClient")
            .field("target", self.encoder.target())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
