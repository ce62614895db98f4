//! HTTP client abstraction so the discovery and routing endpoints can be
//! swapped for canned responses in tests.

use std::future::Future;
use std::time::Duration;

use log::debug;
use reqwest::Url;
use thiserror::Error;

/// Status and body of a completed request. Non-success statuses are not
/// errors at this level.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response (DNS, connect, TLS, body read...).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

pub trait HttpClient: Send + Sync + 'static {
    fn get(&self, url: Url) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Without a timeout the transport default applies.
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: Url) -> Result<HttpResponse, TransportError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError(format!("Request failed: {}", e)))?;
        let status = response.status().as_u16();
        debug!("status {}", status);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(format!("Failed to read response: {}", e)))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
