//! Route lookup.
//!
//! # Responsibilities
//! - Find the matching route for (path, method, host) in a snapshot
//! - Return the matched route with captured parameters, or explicit NotFound
//!
//! # Design Decisions
//! - Stateless; the snapshot is passed in, so a request resolves against
//!   exactly one version of the routing table
//! - O(n) scan over routes (acceptable for typical route counts)
//! - Ranking: segment by segment from the left (literal over parameter
//!   over catch-all, exact end over catch-all), then host-specific over
//!   host-agnostic, then priority, then route key, so results never depend
//!   on load order

use std::cmp::Reverse;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use crate::routing::definition::{CompiledRoute, RouteDefinition, RouteDefinitionSet};
use crate::routing::template::Params;

/// No route accepts the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no route matches {method} {path}")]
pub struct NotFound {
    pub method: String,
    pub path: String,
}

/// A resolved route with captured parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<CompiledRoute>,
    pub params: Params,
    /// Version of the snapshot the route was resolved from.
    pub version: u64,
}

impl RouteMatch {
    pub fn definition(&self) -> &RouteDefinition {
        self.route.definition()
    }

    pub fn key(&self) -> &str {
        self.route.key()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteResolver;

impl RouteResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        path: &str,
        method: &Method,
        host: Option<&str>,
        snapshot: &RouteDefinitionSet,
    ) -> Result<RouteMatch, NotFound> {
        snapshot
            .routes()
            .iter()
            .filter(|route| route.methods().matches(method))
            .filter(|route| route.host().map_or(true, |h| h.matches(host)))
            .filter_map(|route| route.template().matches(path).map(|params| (route, params)))
            .max_by_key(|(route, _)| {
                (
                    route.rank(),
                    route.host().is_some(),
                    route.priority(),
                    Reverse(route.key()),
                )
            })
            .map(|(route, params)| RouteMatch {
                route: route.clone(),
                params,
                version: snapshot.version(),
            })
            .ok_or_else(|| NotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
    }
}
