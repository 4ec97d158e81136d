//! Async HTTP client wrapping reqwest.
//!
//! One attempt per request: 5xx and 429 responses are reported to the
//! caller as errors, never retried.

use crate::config::HttpSettings;
use crate::error::{ConnectorError, ConnectorResult};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL, including the query string.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> ConnectorResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ConnectorError::parse(format!("invalid JSON from {}: {e}", self.url)))
    }
}

/// Shared HTTP client for all connectors.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    concurrency: usize,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> ConnectorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            timeout: settings.timeout,
            concurrency: settings.concurrency.max(1),
        })
    }

    /// Bound on parallel sub-requests inside one connector.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Perform a single GET request with optional query parameters.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> ConnectorResult<HttpResponse> {
        tracing::debug!(url, "GET");

        let resp = self
            .client
            .get(url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConnectorError::Timeout(self.timeout)
                } else {
                    ConnectorError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();

        if status == 429 {
            return Err(ConnectorError::RateLimited {
                url: url.to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(ConnectorError::Status {
                url: url.to_string(),
                status,
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp.bytes().await?.to_vec();

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            content_type,
            body,
        })
    }

    /// GET and decode the body as UTF-8 text.
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> ConnectorResult<String> {
        Ok(self.get(url, query).await?.text())
    }

    /// GET and deserialize a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> ConnectorResult<T> {
        self.get(url, query).await?.json()
    }

    /// GET the raw body bytes.
    pub async fn get_bytes(&self, url: &str) -> ConnectorResult<Vec<u8>> {
        Ok(self.get(url, &[]).await?.body)
    }
}
