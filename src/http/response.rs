//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn an `AggregatedResponse` into the client response
//! - Map gateway errors to appropriate HTTP status codes
//!
//! # Design Decisions
//! - Error bodies are small JSON objects; internal diagnostics never leak
//! - All upstreams timed out results in 504 Gateway Timeout, other total
//!   failures in 502 Bad Gateway

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::aggregate::{AggregateError, AggregatedResponse};
use crate::routing::NotFound;

/// Errors surfaced at the request boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Aggregate(AggregateError::AllUpstreamsFailed {
                all_timeouts: true,
                ..
            }) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Aggregate(AggregateError::AllUpstreamsFailed { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Aggregate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> String {
        match self {
            GatewayError::NotFound(_) => "no matching route".to_string(),
            GatewayError::PayloadTooLarge { .. } => self.to_string(),
            GatewayError::Aggregate(AggregateError::AllUpstreamsFailed {
                all_timeouts: true,
                ..
            }) => "upstream timed out".to_string(),
            GatewayError::Aggregate(AggregateError::AllUpstreamsFailed { .. }) => {
                "upstream request failed".to_string()
            }
            GatewayError::Aggregate(_) => "response aggregation failed".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.client_message() }))).into_response()
    }
}

/// Build the client response. `partial` is dropped here.
pub fn aggregated_response(aggregated: AggregatedResponse) -> Response {
    let mut response = Response::new(Body::from(aggregated.body));
    *response.status_mut() = aggregated.status;
    *response.headers_mut() = aggregated.headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{header, HeaderMap, HeaderValue};

    use crate::aggregate::PartialFailure;

    fn failure(timed_out: bool) -> PartialFailure {
        PartialFailure {
            target_key: "svc".into(),
            target_id: "http://svc:80".into(),
            reason: "boom".into(),
            timed_out,
        }
    }

    #[test]
    fn test_status_mapping() {
        let not_found = GatewayError::from(NotFound {
            method: "GET".into(),
            path: "/x".into(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let timeouts = GatewayError::from(AggregateError::AllUpstreamsFailed {
            failures: vec![failure(true)],
            all_timeouts: true,
        });
        assert_eq!(timeouts.status(), StatusCode::GATEWAY_TIMEOUT);

        let mixed = GatewayError::from(AggregateError::AllUpstreamsFailed {
            failures: vec![failure(true), failure(false)],
            all_timeouts: false,
        });
        assert_eq!(mixed.status(), StatusCode::BAD_GATEWAY);

        let unknown = GatewayError::from(AggregateError::UnknownAggregator("x".into()));
        assert_eq!(unknown.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn test_error_body_hides_diagnostics() {
        let response = GatewayError::from(AggregateError::AllUpstreamsFailed {
            failures: vec![failure(false)],
            all_timeouts: false,
        })
        .into_response();

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("upstream request failed"));
        assert!(!text.contains("boom"));
    }

    #[test]
    fn test_aggregated_response_drops_partial() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = aggregated_response(AggregatedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"{}"),
            partial: Some(vec![failure(true)]),
        });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().len(), 1);
    }
}
