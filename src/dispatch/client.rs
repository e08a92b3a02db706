//! Downstream HTTP client abstraction.
//!
//! The dispatcher only sees [`DownstreamClient`]; the production
//! implementation is a pooled hyper-util client speaking plain HTTP.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

/// A fully buffered request to a downstream target.
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully buffered downstream response.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("reading response body failed: {0}")]
    Body(String),
}

#[async_trait]
pub trait DownstreamClient: Send + Sync {
    async fn send(&self, request: DownstreamRequest) -> Result<DownstreamResponse, ClientError>;
}

/// hyper-util legacy client with connection pooling.
#[derive(Clone)]
pub struct HyperClient {
    client: Client<HttpConnector, Body>,
    max_response_bytes: usize,
}

impl HyperClient {
    pub fn new(connect_timeout: Duration, max_response_bytes: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            max_response_bytes,
        }
    }
}

#[async_trait]
impl DownstreamClient for HyperClient {
    async fn send(&self, request: DownstreamRequest) -> Result<DownstreamResponse, ClientError> {
        let mut builder = Request::builder().method(request.method).uri(request.uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let req = builder
            .body(Body::from(request.body))
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes)
            .await
            .map_err(|e| ClientError::Body(e.to_string()))?;

        Ok(DownstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
