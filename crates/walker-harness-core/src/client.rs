//! Blocking JSON client for the walker routing endpoint.
//!
//! Every request carries its own timeout, independent of the readiness
//! timeout. Response bodies are decoded lossily (invalid UTF-8 becomes
//! U+FFFD) before JSON parsing, so odd bytes from the server produce a
//! readable failure instead of a panic.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::HarnessError;

/// Default routing path on the walker server.
pub const DEFAULT_ROUTE: &str = "/walker/Supervisor";

/// Address of a running server, handed to scenarios read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `http://<host>:<port><path>`; `path` should start with `/`.
    ///
    /// IPv6 literals are bracketed.
    pub fn url(&self, path: &str) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}{}", self.host, self.port, path)
        } else {
            format!("http://{}:{}{}", self.host, self.port, path)
        }
    }
}

/// Parsed `200 OK` response.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedResponse {
    pub status: u16,
    pub body: Value,
}

/// HTTP client bound to one routing path and request timeout.
#[derive(Debug, Clone)]
pub struct RoutingClient {
    http: reqwest::blocking::Client,
    route: String,
    timeout: Duration,
}

impl RoutingClient {
    /// # Errors
    ///
    /// Returns [`HarnessError::RequestTransport`] if the HTTP client cannot
    /// be constructed (TLS backend initialization).
    pub fn new(route: impl Into<String>, timeout: Duration) -> Result<Self, HarnessError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|source| HarnessError::RequestTransport {
                url: "<client setup>".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            route: route.into(),
            timeout,
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Post `payload` to the configured route on `endpoint`.
    pub fn send(&self, endpoint: &Endpoint, payload: &Value) -> Result<RoutedResponse, HarnessError> {
        self.post_json(&endpoint.url(&self.route), payload, self.timeout)
    }

    /// POST `payload` as JSON to `url` and parse the JSON reply.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::RequestTransport`] on connect/read failure or timeout
    /// - [`HarnessError::RequestStatus`] on any status other than 200, with the raw body
    /// - [`HarnessError::ResponseDecode`] when a 200 body is not JSON
    pub fn post_json(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<RoutedResponse, HarnessError> {
        debug!(url, ?timeout, "posting routing query");
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .map_err(|source| HarnessError::RequestTransport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            // The error body is best-effort: a read failure leaves it empty.
            let body = response
                .bytes()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default();
            return Err(HarnessError::RequestStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .map_err(|source| HarnessError::RequestTransport {
                url: url.to_string(),
                source,
            })?;
        let text = String::from_utf8_lossy(&bytes);
        let body: Value =
            serde_json::from_str(&text).map_err(|e| HarnessError::ResponseDecode {
                url: url.to_string(),
                reason: e.to_string(),
                body: text.to_string(),
            })?;

        debug!(url, status = status.as_u16(), "routing query answered");
        Ok(RoutedResponse {
            status: status.as_u16(),
            body,
        })
    }
}
