//! The network seam of the fetch controller.
//!
//! [`Transport`] issues one GET and reports whatever came back. Status
//! classification, retries and pacing all live in the controller, so tests
//! can swap in a scripted transport without touching that policy.

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// A response of any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<RawResponse, FetchError>;
}

/// `reqwest`-backed transport used for real crawls.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es,en;q=0.8"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &Url) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response.text().await.map_err(classify)?;
        debug!(status, bytes = body.len(), "Received response");
        Ok(RawResponse {
            url: final_url,
            status,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        let url = Url::parse("https://example.com").unwrap();
        let ok = RawResponse {
            url: url.clone(),
            status: 204,
            body: String::new(),
        };
        let redirect = RawResponse {
            status: 304,
            ..ok.clone()
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn test_client_builds_with_default_agent() {
        let transport = HttpTransport::new(crate::config::DEFAULT_USER_AGENT, Duration::from_secs(5));
        assert!(transport.is_ok());
    }
}
