//! Named aggregators for `custom-key` routes.
//!
//! Aggregators are registered explicitly at startup; there is no runtime
//! discovery. The registry is immutable once the server is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

use crate::aggregate::aggregator::{body_to_json, AggregatedResponse};
use crate::dispatch::DownstreamCallResult;

/// A user-supplied combination of downstream results.
///
/// Receives every result in target order, failed ones included. It is only
/// invoked when at least one call succeeded.
pub trait DefinedAggregator: Send + Sync {
    fn aggregate(&self, results: &[DownstreamCallResult]) -> Result<AggregatedResponse, String>;
}

/// Successful bodies as a JSON array, in target order.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonArrayAggregator;

impl DefinedAggregator for JsonArrayAggregator {
    fn aggregate(&self, results: &[DownstreamCallResult]) -> Result<AggregatedResponse, String> {
        let items: Vec<Value> = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| body_to_json(&r.body))
            .collect();
        let body = serde_json::to_vec(&Value::Array(items)).map_err(|e| e.to_string())?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(AggregatedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body),
            partial: None,
        })
    }
}

#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    aggregators: HashMap<String, Arc<dyn DefinedAggregator>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `json-array` aggregator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("json-array", JsonArrayAggregator);
        registry
    }

    /// Register `aggregator` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, aggregator: impl DefinedAggregator + 'static) {
        self.aggregators.insert(name.into(), Arc::new(aggregator));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DefinedAggregator>> {
        self.aggregators.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.aggregators.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("aggregators", &self.names())
            .finish()
    }
}
