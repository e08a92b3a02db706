//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Enforce the body size limit while buffering
//! - Extract routing-relevant information (host, path, query)
//! - Convert the Axum request into the dispatcher's `InboundRequest`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Bodies are buffered once and shared by every fan-out call

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderValue, Request},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub use crate::dispatch::request::X_REQUEST_ID;
use crate::dispatch::InboundRequest;
use crate::http::response::GatewayError;

/// Generates `x-request-id` values for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Host the client addressed: the Host header, or the URI authority for
/// HTTP/2 requests.
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
}

/// Buffer `request` into an [`InboundRequest`], failing with 413 when the
/// body exceeds `max_body_bytes`.
pub async fn into_inbound(
    request: Request<Body>,
    max_body_bytes: usize,
) -> Result<InboundRequest, GatewayError> {
    let host = request_host(&request);
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge {
            limit: max_body_bytes,
        })?;

    Ok(InboundRequest {
        request_id: request_id(&parts.headers),
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        host,
        headers: parts.headers,
        body,
        client_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[tokio::test]
    async fn test_into_inbound() {
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/orders/42?dry_run=true")
            .header(header::HOST, "api.example.com")
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::from("payload"))
            .unwrap();

        let inbound = into_inbound(request, 1024).await.unwrap();
        assert_eq!(inbound.method, Method::PUT);
        assert_eq!(inbound.path, "/orders/42");
        assert_eq!(inbound.query.as_deref(), Some("dry_run=true"));
        assert_eq!(inbound.host.as_deref(), Some("api.example.com"));
        assert_eq!(inbound.request_id.as_deref(), Some("abc-123"));
        assert_eq!(&inbound.body[..], b"payload");
        assert!(inbound.client_addr.is_none());
    }

    #[tokio::test]
    async fn test_body_limit() {
        let request = Request::builder()
            .uri("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();

        assert!(matches!(
            into_inbound(request, 16).await,
            Err(GatewayError::PayloadTooLarge { limit: 16 })
        ));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut make = MakeRequestUuid;
        let request = Request::new(());
        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
