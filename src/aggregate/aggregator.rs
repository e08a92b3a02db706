//! Response aggregation.
//!
//! # Responsibilities
//! - Turn the dispatcher's per-target results into one upstream response
//! - Apply the route's strategy (pass-through, JSON merge, named aggregator)
//! - Record which targets were left out
//!
//! # Data Flow
//! ```text
//! Vec<DownstreamCallResult> (target order)
//!     → none:        single result passed through
//!     → merge-json:  successful bodies under their target keys
//!     → custom-key:  AggregatorRegistry lookup, then the named aggregator
//!     → AggregatedResponse { status, headers, body, partial }
//! ```
//!
//! # Design Decisions
//! - `partial` is diagnostic only; the HTTP layer logs it and never sends it
//! - Every strategy fails with `AllUpstreamsFailed` when nothing usable came back
//! - Non-JSON bodies are embedded as JSON strings, empty bodies as null

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::aggregate::registry::AggregatorRegistry;
use crate::dispatch::request::strip_hop_by_hop;
use crate::dispatch::DownstreamCallResult;
use crate::routing::{AggregationStrategy, KeyConflict};

/// A target that contributed nothing to an aggregated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub target_key: String,
    pub target_id: String,
    pub reason: String,
    pub timed_out: bool,
}

impl PartialFailure {
    fn from_result(result: &DownstreamCallResult) -> Self {
        let reason = match (&result.error, result.status) {
            (Some(error), _) => error.to_string(),
            (None, Some(status)) => format!("status {}", status.as_u16()),
            (None, None) => "no response".to_string(),
        };
        Self {
            target_key: result.target_key.clone(),
            target_id: result.target_id.clone(),
            reason,
            timed_out: result.is_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Targets left out of the response; `None` when every target contributed.
    pub partial: Option<Vec<PartialFailure>>,
}

impl AggregatedResponse {
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("all {} downstream calls failed", failures.len())]
    AllUpstreamsFailed {
        failures: Vec<PartialFailure>,
        all_timeouts: bool,
    },

    #[error("unknown aggregator {0:?}")]
    UnknownAggregator(String),

    #[error("downstream key {0:?} is shared by several targets")]
    KeyConflict(String),

    #[error("aggregator {name:?} failed: {reason}")]
    Aggregator { name: String, reason: String },
}

impl AggregateError {
    fn all_failed(failures: Vec<PartialFailure>) -> Self {
        let all_timeouts = !failures.is_empty() && failures.iter().all(|f| f.timed_out);
        AggregateError::AllUpstreamsFailed {
            failures,
            all_timeouts,
        }
    }
}

/// Parse a downstream body for embedding in a JSON document.
pub fn body_to_json(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn json_response(value: &Value) -> Result<(HeaderMap, Bytes), AggregateError> {
    let body = serde_json::to_vec(value).map_err(|e| AggregateError::Aggregator {
        name: "merge-json".to_string(),
        reason: e.to_string(),
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok((headers, Bytes::from(body)))
}

fn failures(results: &[DownstreamCallResult]) -> Vec<PartialFailure> {
    results
        .iter()
        .filter(|r| !r.is_success())
        .map(PartialFailure::from_result)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ResponseAggregator {
    registry: AggregatorRegistry,
}

impl ResponseAggregator {
    pub fn new(registry: AggregatorRegistry) -> Self {
        Self { registry }
    }

    pub fn aggregate(
        &self,
        strategy: &AggregationStrategy,
        results: Vec<DownstreamCallResult>,
    ) -> Result<AggregatedResponse, AggregateError> {
        match strategy {
            AggregationStrategy::None => self.pass_through(results),
            AggregationStrategy::MergeJson { on_key_conflict } => {
                self.merge_json(*on_key_conflict, &results)
            }
            AggregationStrategy::CustomKey { aggregator } => self.custom(aggregator, &results),
        }
    }

    fn pass_through(
        &self,
        results: Vec<DownstreamCallResult>,
    ) -> Result<AggregatedResponse, AggregateError> {
        let Some(result) = results.into_iter().next() else {
            return Err(AggregateError::all_failed(Vec::new()));
        };

        match (result.status, &result.error) {
            (Some(status), None) => {
                let mut headers = result.headers;
                strip_hop_by_hop(&mut headers);
                headers.remove(header::CONTENT_LENGTH);
                Ok(AggregatedResponse {
                    status,
                    headers,
                    body: result.body,
                    partial: None,
                })
            }
            _ => Err(AggregateError::all_failed(vec![PartialFailure::from_result(
                &result,
            )])),
        }
    }

    fn merge_json(
        &self,
        on_key_conflict: KeyConflict,
        results: &[DownstreamCallResult],
    ) -> Result<AggregatedResponse, AggregateError> {
        let failed = failures(results);
        if failed.len() == results.len() {
            return Err(AggregateError::all_failed(failed));
        }

        // Keys shared by several targets, across successes and failures alike,
        // so a collected key keeps its array shape when some targets fail.
        let mut merged = Map::new();
        for result in results.iter().filter(|r| r.is_success()) {
            let key = &result.target_key;
            let shared = results.iter().filter(|r| &r.target_key == key).count() > 1;
            let value = body_to_json(&result.body);

            if !shared {
                merged.insert(key.clone(), value);
                continue;
            }
            match on_key_conflict {
                KeyConflict::Reject => return Err(AggregateError::KeyConflict(key.clone())),
                KeyConflict::Collect => {
                    let slot = merged
                        .entry(key.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = slot {
                        items.push(value);
                    }
                }
            }
        }

        let (headers, body) = json_response(&Value::Object(merged))?;
        Ok(AggregatedResponse {
            status: StatusCode::OK,
            headers,
            body,
            partial: (!failed.is_empty()).then_some(failed),
        })
    }

    fn custom(
        &self,
        name: &str,
        results: &[DownstreamCallResult],
    ) -> Result<AggregatedResponse, AggregateError> {
        let aggregator = self
            .registry
            .get(name)
            .ok_or_else(|| AggregateError::UnknownAggregator(name.to_string()))?;

        let failed = failures(results);
        if failed.len() == results.len() {
            return Err(AggregateError::all_failed(failed));
        }

        let mut response =
            aggregator
                .aggregate(results)
                .map_err(|reason| AggregateError::Aggregator {
                    name: name.to_string(),
                    reason,
                })?;
        if response.partial.is_none() && !failed.is_empty() {
            response.partial = Some(failed);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::dispatch::CallError;

    fn ok(key: &str, status: u16, body: &'static str) -> DownstreamCallResult {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        DownstreamCallResult {
            target_key: key.to_string(),
            target_id: format!("http://{key}:80"),
            status: Some(StatusCode::from_u16(status).unwrap()),
            headers,
            body: Bytes::from_static(body.as_bytes()),
            latency: Duration::from_millis(5),
            attempts: 1,
            error: None,
        }
    }

    fn failed(key: &str, error: CallError) -> DownstreamCallResult {
        DownstreamCallResult::failed(key, format!("http://{key}:80"), error, Duration::ZERO, 1)
    }

    fn merge() -> AggregationStrategy {
        AggregationStrategy::MergeJson {
            on_key_conflict: KeyConflict::Reject,
        }
    }

    fn body_json(response: &AggregatedResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_pass_through_unchanged() {
        let aggregator = ResponseAggregator::default();
        let response = aggregator
            .aggregate(&AggregationStrategy::None, vec![ok("svc", 404, r#"{"error":"nope"}"#)])
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(&response.body[..], br#"{"error":"nope"}"#);
        assert_eq!(response.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert!(response.headers.get(header::CONNECTION).is_none());
        assert!(!response.is_partial());
    }

    #[test]
    fn test_pass_through_failure_propagates() {
        let aggregator = ResponseAggregator::default();
        let err = aggregator
            .aggregate(&AggregationStrategy::None, vec![failed("svc", CallError::Timeout)])
            .unwrap_err();

        match err {
            AggregateError::AllUpstreamsFailed {
                failures,
                all_timeouts,
            } => {
                assert!(all_timeouts);
                assert_eq!(failures[0].target_key, "svc");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_merge_k_of_n() {
        let aggregator = ResponseAggregator::default();
        let response = aggregator
            .aggregate(
                &merge(),
                vec![
                    ok("order", 200, r#"{"id":42}"#),
                    failed("customer", CallError::CircuitOpen),
                    ok("shipping", 200, "in transit"),
                ],
            )
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let json = body_json(&response);
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(json["order"]["id"], 42);
        assert_eq!(json["shipping"], "in transit");

        let partial = response.partial.unwrap();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].target_key, "customer");
    }

    #[test]
    fn test_merge_all_successful_is_not_partial() {
        let aggregator = ResponseAggregator::default();
        let response = aggregator
            .aggregate(&merge(), vec![ok("a", 200, "1"), ok("b", 201, "")])
            .unwrap();
        let json = body_json(&response);
        assert_eq!(json["a"], 1);
        assert!(json["b"].is_null());
        assert!(!response.is_partial());
    }

    #[test]
    fn test_merge_non_2xx_is_a_failure() {
        let aggregator = ResponseAggregator::default();
        let response = aggregator
            .aggregate(&merge(), vec![ok("a", 200, "{}"), ok("b", 500, "boom")])
            .unwrap();
        assert!(body_json(&response).get("b").is_none());
        assert_eq!(response.partial.unwrap()[0].reason, "status 500");
    }

    #[test]
    fn test_merge_all_failed() {
        let aggregator = ResponseAggregator::default();
        let err = aggregator
            .aggregate(
                &merge(),
                vec![
                    failed("a", CallError::Timeout),
                    failed("b", CallError::Transport("refused".into())),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::AllUpstreamsFailed {
                all_timeouts: false,
                ..
            }
        ));
    }

    #[test]
    fn test_merge_collects_shared_keys() {
        let aggregator = ResponseAggregator::default();
        let strategy = AggregationStrategy::MergeJson {
            on_key_conflict: KeyConflict::Collect,
        };
        let response = aggregator
            .aggregate(
                &strategy,
                vec![
                    ok("items", 200, "[1]"),
                    failed("items", CallError::Timeout),
                    ok("items", 200, "[2]"),
                    ok("meta", 200, r#"{"n":2}"#),
                ],
            )
            .unwrap();
        let json = body_json(&response);
        assert_eq!(json["items"], serde_json::json!([[1], [2]]));
        assert_eq!(json["meta"]["n"], 2);
        assert!(response.is_partial());
    }

    #[test]
    fn test_merge_rejects_shared_keys() {
        let aggregator = ResponseAggregator::default();
        let err = aggregator
            .aggregate(&merge(), vec![ok("x", 200, "1"), ok("x", 200, "2")])
            .unwrap_err();
        assert_eq!(err, AggregateError::KeyConflict("x".to_string()));
    }

    #[test]
    fn test_merge_preserves_target_order() {
        let aggregator = ResponseAggregator::default();
        let response = aggregator
            .aggregate(&merge(), vec![ok("zeta", 200, "1"), ok("alpha", 200, "2")])
            .unwrap();
        assert_eq!(&response.body[..], br#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn test_custom_json_array() {
        let aggregator = ResponseAggregator::new(AggregatorRegistry::with_builtins());
        let strategy = AggregationStrategy::CustomKey {
            aggregator: "json-array".to_string(),
        };
        let response = aggregator
            .aggregate(
                &strategy,
                vec![ok("a", 200, r#"{"a":1}"#), failed("b", CallError::Timeout), ok("c", 200, "3")],
            )
            .unwrap();
        assert_eq!(body_json(&response), serde_json::json!([{"a": 1}, 3]));
        assert_eq!(response.partial.unwrap().len(), 1);
    }

    #[test]
    fn test_custom_unknown_aggregator() {
        let aggregator = ResponseAggregator::new(AggregatorRegistry::with_builtins());
        let strategy = AggregationStrategy::CustomKey {
            aggregator: "nope".to_string(),
        };
        assert_eq!(
            aggregator.aggregate(&strategy, vec![ok("a", 200, "1")]).unwrap_err(),
            AggregateError::UnknownAggregator("nope".to_string())
        );
    }

    #[test]
    fn test_custom_all_failed() {
        let aggregator = ResponseAggregator::new(AggregatorRegistry::with_builtins());
        let strategy = AggregationStrategy::CustomKey {
            aggregator: "json-array".to_string(),
        };
        let err = aggregator
            .aggregate(&strategy, vec![failed("a", CallError::Timeout)])
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::AllUpstreamsFailed {
                all_timeouts: true,
                ..
            }
        ));
    }
}
