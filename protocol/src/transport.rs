//! HTTP plumbing shared by the Issuer and Ledger adapters.
//!
//! A thin wrapper over `reqwest` that applies the defaults every outbound
//! call needs: a per-request timeout and the `User-Agent` header. It does
//! not retry. Whether a failure is worth retrying depends on which
//! protocol step failed, so that decision belongs to the caller (see
//! [`crate::retry`]).

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::USER_AGENT;

/// The request never produced an HTTP status.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub url: String,
    pub timed_out: bool,
    pub message: String,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.timed_out {
            write!(f, "{}: timed out ({})", self.url, self.message)
        } else {
            write!(f, "{}: {}", self.url, self.message)
        }
    }
}

/// A complete HTTP exchange: status plus the raw body.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 and 5xx: the server is overloaded or broken, not the request.
    pub fn is_transient(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// The `reason` field of a JSON error body, or `HTTP <status>`.
    pub fn reason(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("reason").and_then(|r| r.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// Outbound HTTP with protocol defaults applied.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Send a request and read the whole body.
    pub async fn send(&self, request: RequestBuilder) -> Result<HttpReply, TransportError> {
        let (client, request) = request.build_split();
        let request = request.map_err(|err| TransportError {
            url: err
                .url()
                .map(|url| url.to_string())
                .unwrap_or_else(|| "<unknown>".to_string()),
            timed_out: false,
            message: format!("request build failed: {err}"),
        })?;
        let url = request.url().to_string();
        let method = request.method().clone();

        let response = client.execute(request).await.map_err(|err| TransportError {
            url: url.clone(),
            timed_out: err.is_timeout(),
            message: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| TransportError {
            url: url.clone(),
            timed_out: err.is_timeout(),
            message: format!("failed to read body: {err}"),
        })?;

        tracing::debug!(%method, %url, status, "http exchange");
        Ok(HttpReply { url, status, body })
    }
}
