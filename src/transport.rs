use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method};

use crate::error::TransportError;

/// One fully resolved HTTP request. Every attempt of a call re-sends it unchanged.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Deadline for the whole round trip; expiry is a [`TransportError`].
    pub timeout: Option<Duration>,
}

/// Status and body of one HTTP round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs a single HTTP round trip.
///
/// Implementations must be safe to share across concurrent calls and report
/// connect, timeout and body-read failures as [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing client, sharing its connection pool.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        // The timeout covers the whole round trip, including reading the body.
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|err| {
            TransportError::new(
                format!("request to {} {} failed", request.method, request.url),
                err,
            )
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::new("failed to read response body", err))?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}
