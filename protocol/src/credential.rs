//! # Credential Requester
//!
//! Before the Ledger accepts an action it wants proof that an Issuer
//! authorized it. The requester asks the Issuer for that proof, a
//! [`Credential`], and hands it back untouched.
//!
//! The Issuer is told who is asking (principal id and verifying key) and
//! what kind of action it is ([`ActionDescriptor`]). It never sees the action
//! plaintext and never sees a private key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::action::{Action, ActionDescriptor};
use crate::config::{endpoint, ISSUER_CREDENTIALS_PATH};
use crate::crypto::PrincipalPublicKey;
use crate::error::Error;
use crate::session::PrincipalSession;
use crate::transport::HttpTransport;

/// An opaque issuer token. Forwarded byte for byte to the Ledger.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({} bytes)", self.0.len())
    }
}

/// Body of `POST /credentials`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub principal_id: String,
    /// Hex Ed25519 verifying key.
    pub verifying_key: String,
    pub action: ActionDescriptor,
}

impl CredentialRequest {
    pub fn new(principal_id: &str, signer: &PrincipalPublicKey, action: &Action) -> Self {
        Self {
            principal_id: principal_id.to_string(),
            verifying_key: signer.verifying_key_hex(),
            action: action.descriptor(),
        }
    }
}

#[derive(Deserialize)]
struct CredentialResponse {
    credential: String,
}

/// Something that issues credentials.
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Returns `CredentialDenied` when the issuer refuses and
    /// `CredentialUnavailable` when it cannot be asked.
    async fn issue(&self, request: &CredentialRequest) -> Result<Credential, Error>;
}

/// [`Issuer`] over JSON/HTTP.
#[derive(Clone, Debug)]
pub struct HttpIssuer {
    base_url: String,
    transport: HttpTransport,
}

impl HttpIssuer {
    pub fn new(base_url: impl Into<String>, transport: HttpTransport) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
        }
    }
}

#[async_trait]
impl Issuer for HttpIssuer {
    async fn issue(&self, request: &CredentialRequest) -> Result<Credential, Error> {
        let url = endpoint(&self.base_url, ISSUER_CREDENTIALS_PATH);
        let reply = self
            .transport
            .send(self.transport.post(&url).json(request))
            .await
            .map_err(|err| Error::CredentialUnavailable(err.to_string()))?;

        if reply.is_success() {
            let body: CredentialResponse = reply.json().map_err(|err| {
                Error::CredentialUnavailable(format!("malformed issuer response: {err}"))
            })?;
            return Ok(Credential::new(body.credential));
        }
        // 429 and 5xx say nothing about the request itself.
        if reply.is_transient() || !(400..500).contains(&reply.status) {
            return Err(Error::CredentialUnavailable(format!(
                "issuer answered HTTP {}",
                reply.status
            )));
        }
        Err(Error::CredentialDenied {
            reason: reply.reason(),
        })
    }
}

/// Builds credential requests from a session and forwards them to an [`Issuer`].
#[derive(Clone)]
pub struct CredentialRequester {
    issuer: Arc<dyn Issuer>,
}

impl CredentialRequester {
    pub fn new(issuer: Arc<dyn Issuer>) -> Self {
        Self { issuer }
    }

    /// The request the session would send for `action`.
    pub fn build_request(
        action: &Action,
        session: &PrincipalSession,
    ) -> Result<CredentialRequest, Error> {
        let public = session.public_key().ok_or(Error::MissingKeys)?;
        Ok(CredentialRequest::new(session.principal_id(), &public, action))
    }

    pub async fn request_credential(
        &self,
        action: &Action,
        session: &PrincipalSession,
    ) -> Result<Credential, Error> {
        let request = Self::build_request(action, session)?;
        self.send(&request).await
    }

    /// Send a pre-built request. Used when the caller already pinned the keys.
    pub async fn send(&self, request: &CredentialRequest) -> Result<Credential, Error> {
        match self.issuer.issue(request).await {
            Ok(credential) => {
                tracing::info!(
                    principal = %request.principal_id,
                    kind = %request.action.kind,
                    "credential issued"
                );
                Ok(credential)
            }
            Err(err) => {
                tracing::warn!(
                    principal = %request.principal_id,
                    kind = %request.action.kind,
                    error = %err,
                    "credential request failed"
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for CredentialRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRequester").finish_non_exhaustive()
    }
}
