//! Route definitions and the immutable, versioned set built from them.
//!
//! # Data Flow
//! ```text
//! Vec<RouteDefinition>  (from a RouteSource)
//!     → CompiledRoute::compile (parse templates, validate targets)
//!     → RouteDefinitionSet::build (uniqueness across routes)
//!     → Arc<RouteDefinitionSet> installed by the store
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::matcher::{HostMatcher, MethodMatcher};
use crate::routing::template::{PathTemplate, TemplateError, TemplateRank};

/// A single routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteDefinition {
    /// Route identifier for logging/metrics.
    pub key: String,

    /// Upstream path template, e.g. `/orders/{id}`.
    pub upstream_path_template: String,

    /// Accepted methods; empty accepts all.
    #[serde(default)]
    pub upstream_methods: Vec<String>,

    /// Host header to match (exact match, case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,

    /// Ordered downstream targets.
    pub downstream: Vec<DownstreamTarget>,

    #[serde(default)]
    pub aggregation: AggregationStrategy,

    /// Tie-breaker between equally specific templates (higher wins).
    #[serde(default)]
    pub priority: u32,

    /// Overrides the fan-out deadline for this route, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A downstream service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DownstreamTarget {
    /// Key under which this target's body is placed when aggregating.
    /// Defaults to `host:port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    pub host: String,

    pub port: u16,

    /// Downstream path template; may use the upstream placeholders.
    pub path_template: String,
}

fn default_scheme() -> String {
    "http".to_string()
}

impl DownstreamTarget {
    pub fn new(host: impl Into<String>, port: u16, path_template: impl Into<String>) -> Self {
        Self {
            key: None,
            scheme: default_scheme(),
            host: host.into(),
            port,
            path_template: path_template.into(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// `host:port`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Aggregation key.
    pub fn key(&self) -> String {
        self.key.clone().unwrap_or_else(|| self.authority())
    }

    /// Identity used for circuit breaking, shared by every route that
    /// targets the same endpoint.
    pub fn id(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }
}

/// How multiple downstream responses become one upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AggregationStrategy {
    /// Single target, response passed through.
    #[default]
    None,
    /// Bodies merged into one JSON object keyed by target key.
    MergeJson {
        #[serde(default)]
        on_key_conflict: KeyConflict,
    },
    /// Delegates to a named aggregator from the registry.
    CustomKey { aggregator: String },
}

impl AggregationStrategy {
    pub fn is_fan_out(&self) -> bool {
        !matches!(self, AggregationStrategy::None)
    }
}

/// Policy when two targets of a `merge-json` route share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyConflict {
    /// Refuse the route definition.
    #[default]
    Reject,
    /// Gather the colliding values into a JSON array, in target order.
    Collect,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("route {route:?}: {source}")]
    Template {
        route: String,
        #[source]
        source: TemplateError,
    },

    #[error("route {route:?}: invalid method {method:?}")]
    InvalidMethod { route: String, method: String },

    #[error("route {route:?}: empty route key")]
    EmptyKey { route: String },

    #[error("route {route:?}: no downstream targets")]
    NoTargets { route: String },

    #[error("route {route:?}: aggregation 'none' requires exactly one target, found {count}")]
    SingleTargetRequired { route: String, count: usize },

    #[error("route {route:?}: unsupported downstream scheme {scheme:?} (only http)")]
    UnsupportedScheme { route: String, scheme: String },

    #[error("route {route:?}: invalid downstream target: {reason}")]
    InvalidTarget { route: String, reason: String },

    #[error("route {route:?}: downstream placeholder {{{name}}} is not captured upstream")]
    UnknownPlaceholder { route: String, name: String },

    #[error("route {route:?}: duplicate downstream key {key:?}")]
    DuplicateTargetKey { route: String, key: String },

    #[error("route {route:?}: custom-key aggregation needs an aggregator name")]
    EmptyAggregator { route: String },

    #[error("duplicate route key {0:?}")]
    DuplicateRouteKey(String),

    #[error("routes {first:?} and {second:?} share template {template:?} with overlapping methods")]
    Conflict {
        first: String,
        second: String,
        template: String,
    },
}

/// A downstream target with its parsed path template.
#[derive(Debug, Clone)]
pub struct CompiledTarget {
    pub target: DownstreamTarget,
    pub path: PathTemplate,
}

/// A validated route ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    definition: Arc<RouteDefinition>,
    template: PathTemplate,
    methods: MethodMatcher,
    host: Option<HostMatcher>,
    targets: Vec<CompiledTarget>,
    rank: TemplateRank,
}

impl CompiledRoute {
    pub fn compile(definition: RouteDefinition) -> Result<Self, DefinitionError> {
        let route = definition.key.clone();
        if route.trim().is_empty() {
            return Err(DefinitionError::EmptyKey {
                route: definition.upstream_path_template.clone(),
            });
        }

        let template = PathTemplate::parse(&definition.upstream_path_template).map_err(|source| {
            DefinitionError::Template {
                route: route.clone(),
                source,
            }
        })?;

        let methods = MethodMatcher::parse(&definition.upstream_methods).map_err(|method| {
            DefinitionError::InvalidMethod {
                route: route.clone(),
                method,
            }
        })?;

        let host = definition
            .upstream_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(HostMatcher::new);

        if definition.downstream.is_empty() {
            return Err(DefinitionError::NoTargets { route });
        }

        match &definition.aggregation {
            AggregationStrategy::None if definition.downstream.len() != 1 => {
                return Err(DefinitionError::SingleTargetRequired {
                    route,
                    count: definition.downstream.len(),
                });
            }
            AggregationStrategy::MergeJson {
                on_key_conflict: KeyConflict::Reject,
            } => {
                let mut seen = Vec::new();
                for target in &definition.downstream {
                    let key = target.key();
                    if seen.contains(&key) {
                        return Err(DefinitionError::DuplicateTargetKey { route, key });
                    }
                    seen.push(key);
                }
            }
            AggregationStrategy::CustomKey { aggregator } if aggregator.trim().is_empty() => {
                return Err(DefinitionError::EmptyAggregator { route });
            }
            _ => {}
        }

        let upstream_names: Vec<&str> = template.placeholders().collect();
        let mut targets = Vec::with_capacity(definition.downstream.len());
        for target in &definition.downstream {
            if !target.scheme.eq_ignore_ascii_case("http") {
                return Err(DefinitionError::UnsupportedScheme {
                    route,
                    scheme: target.scheme.clone(),
                });
            }
            if target.host.trim().is_empty() {
                return Err(DefinitionError::InvalidTarget {
                    route,
                    reason: "empty host".to_string(),
                });
            }
            if target.port == 0 {
                return Err(DefinitionError::InvalidTarget {
                    route,
                    reason: format!("port 0 for host {}", target.host),
                });
            }
            let path = PathTemplate::parse(&target.path_template).map_err(|source| {
                DefinitionError::Template {
                    route: route.clone(),
                    source,
                }
            })?;
            if let Some(name) = path.placeholders().find(|n| !upstream_names.contains(n)) {
                return Err(DefinitionError::UnknownPlaceholder {
                    route,
                    name: name.to_string(),
                });
            }
            targets.push(CompiledTarget {
                target: target.clone(),
                path,
            });
        }

        Ok(Self {
            definition: Arc::new(definition),
            rank: template.rank(),
            template,
            methods,
            host,
            targets,
        })
    }

    pub fn definition(&self) -> &RouteDefinition {
        &self.definition
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn methods(&self) -> &MethodMatcher {
        &self.methods
    }

    pub fn host(&self) -> Option<&HostMatcher> {
        self.host.as_ref()
    }

    pub fn targets(&self) -> &[CompiledTarget] {
        &self.targets
    }

    pub fn aggregation(&self) -> &AggregationStrategy {
        &self.definition.aggregation
    }

    pub fn priority(&self) -> u32 {
        self.definition.priority
    }

    /// Template specificity, see [`PathTemplate::rank`].
    pub fn rank(&self) -> &TemplateRank {
        &self.rank
    }

    /// True if both routes could claim the same request.
    fn conflicts_with(&self, other: &CompiledRoute) -> bool {
        self.template.shape() == other.template.shape()
            && self.host.as_ref().map(HostMatcher::host) == other.host.as_ref().map(HostMatcher::host)
            && self.methods.overlaps(&other.methods)
            && (self.priority() == other.priority()
                || self.template.as_str() == other.template.as_str())
    }
}

/// An immutable, versioned snapshot of all active routes.
#[derive(Debug, Default)]
pub struct RouteDefinitionSet {
    version: u64,
    routes: Vec<Arc<CompiledRoute>>,
}

impl RouteDefinitionSet {
    /// The empty set installed before the first successful load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and compile definitions. All errors are reported.
    pub fn build(
        version: u64,
        definitions: Vec<RouteDefinition>,
    ) -> Result<Self, Vec<DefinitionError>> {
        let mut errors = Vec::new();
        let mut routes: Vec<Arc<CompiledRoute>> = Vec::with_capacity(definitions.len());
        let mut keys: HashSet<String> = HashSet::new();

        for definition in definitions {
            if !keys.insert(definition.key.clone()) {
                errors.push(DefinitionError::DuplicateRouteKey(definition.key.clone()));
                continue;
            }
            match CompiledRoute::compile(definition) {
                Ok(route) => {
                    if let Some(existing) = routes.iter().find(|r| r.conflicts_with(&route)) {
                        errors.push(DefinitionError::Conflict {
                            first: existing.key().to_string(),
                            second: route.key().to_string(),
                            template: route.template().shape(),
                        });
                        continue;
                    }
                    routes.push(Arc::new(route));
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(Self { version, routes })
        } else {
            Err(errors)
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn routes(&self) -> &[Arc<CompiledRoute>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<CompiledRoute>> {
        self.routes.iter().find(|r| r.key() == key)
    }

    /// Clones of the source definitions, in load order.
    pub fn definitions(&self) -> Vec<RouteDefinition> {
        self.routes.iter().map(|r| r.definition().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(key: &str, template: &str, methods: &[&str]) -> RouteDefinition {
        RouteDefinition {
            key: key.to_string(),
            upstream_path_template: template.to_string(),
            upstream_methods: methods.iter().map(|m| m.to_string()).collect(),
            upstream_host: None,
            downstream: vec![DownstreamTarget::new("svc-a", 8080, "/")],
            aggregation: AggregationStrategy::None,
            priority: 0,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_compile_valid_route() {
        let mut def = route("orders", "/orders/{id}", &["get"]);
        def.downstream = vec![DownstreamTarget::new("svc-a", 8080, "/o/{id}")];
        let compiled = CompiledRoute::compile(def).unwrap();
        assert_eq!(compiled.key(), "orders");
        assert_eq!(compiled.targets().len(), 1);
        assert!(compiled.methods().matches(&axum::http::Method::GET));
    }

    #[test]
    fn test_none_requires_single_target() {
        let mut def = route("r", "/x", &[]);
        def.downstream.push(DownstreamTarget::new("svc-b", 8080, "/"));
        assert!(matches!(
            CompiledRoute::compile(def),
            Err(DefinitionError::SingleTargetRequired { count: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_downstream_placeholder() {
        let mut def = route("r", "/orders/{id}", &[]);
        def.downstream = vec![DownstreamTarget::new("svc-a", 8080, "/o/{order}")];
        assert!(matches!(
            CompiledRoute::compile(def),
            Err(DefinitionError::UnknownPlaceholder { name, .. }) if name == "order"
        ));
    }

    #[test]
    fn test_https_target_rejected() {
        let mut def = route("r", "/x", &[]);
        def.downstream[0].scheme = "https".to_string();
        assert!(matches!(
            CompiledRoute::compile(def),
            Err(DefinitionError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_merge_json_duplicate_keys() {
        let mut def = route("dash", "/dashboard", &["GET"]);
        def.downstream = vec![
            DownstreamTarget::new("svc-a", 1, "/").with_key("data"),
            DownstreamTarget::new("svc-b", 2, "/").with_key("data"),
        ];
        def.aggregation = AggregationStrategy::MergeJson {
            on_key_conflict: KeyConflict::Reject,
        };
        assert!(matches!(
            CompiledRoute::compile(def.clone()),
            Err(DefinitionError::DuplicateTargetKey { .. })
        ));

        def.aggregation = AggregationStrategy::MergeJson {
            on_key_conflict: KeyConflict::Collect,
        };
        assert!(CompiledRoute::compile(def).is_ok());
    }

    #[test]
    fn test_set_rejects_conflicting_templates() {
        let defs = vec![
            route("a", "/orders/{id}", &["GET"]),
            route("b", "/orders/{oid}", &["get", "POST"]),
        ];
        let errors = RouteDefinitionSet::build(1, defs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], DefinitionError::Conflict { .. }));
    }

    #[test]
    fn test_priority_separates_same_shape() {
        let mut preferred = route("b", "/orders/{oid}", &[]);
        preferred.priority = 5;
        let set = RouteDefinitionSet::build(1, vec![route("a", "/orders/{id}", &["GET"]), preferred]);
        assert!(set.is_ok());

        // The same template written twice is never allowed
        let mut duplicate = route("b", "/orders/{id}", &[]);
        duplicate.priority = 5;
        let errors =
            RouteDefinitionSet::build(1, vec![route("a", "/orders/{id}", &["GET"]), duplicate])
                .unwrap_err();
        assert!(matches!(errors[0], DefinitionError::Conflict { .. }));
    }

    #[test]
    fn test_set_allows_disjoint_methods_and_hosts() {
        let mut other_host = route("c", "/orders/{id}", &["GET"]);
        other_host.upstream_host = Some("api.example.com".to_string());
        let defs = vec![
            route("a", "/orders/{id}", &["GET"]),
            route("b", "/orders/{id}", &["POST"]),
            other_host,
        ];
        let set = RouteDefinitionSet::build(7, defs).unwrap();
        assert_eq!(set.version(), 7);
        assert_eq!(set.len(), 3);
        assert!(set.get("b").is_some());
    }

    #[test]
    fn test_set_reports_all_errors() {
        let defs = vec![
            route("a", "no-slash", &[]),
            route("a", "/dup", &[]),
            route("b", "/ok", &["BAD METHOD"]),
        ];
        let errors = RouteDefinitionSet::build(1, defs).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_aggregation_serde() {
        let json = r#"{"type":"merge-json","on_key_conflict":"collect"}"#;
        let strategy: AggregationStrategy = serde_json::from_str(json).unwrap();
        assert_eq!(
            strategy,
            AggregationStrategy::MergeJson {
                on_key_conflict: KeyConflict::Collect
            }
        );

        let strategy: AggregationStrategy =
            serde_json::from_str(r#"{"type":"custom-key","aggregator":"json-array"}"#).unwrap();
        assert!(strategy.is_fan_out());
    }
}
