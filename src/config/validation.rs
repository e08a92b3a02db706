//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts >= 1)
//! - Check the route source is fully specified
//! - Validate statically configured routes, including conflicts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, SourceKind};
use crate::routing::{DefinitionError, RouteDefinitionSet};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("store.url is required when store.source = \"http\"")]
    MissingSourceUrl,

    #[error("store.url '{0}' is not a valid URL")]
    InvalidSourceUrl(String),

    #[error("retries.budget_ratio must be between 0 and 1")]
    InvalidBudgetRatio,

    #[error("observability.log_format must be \"text\" or \"json\"")]
    InvalidLogFormat,

    #[error("{field} ({deadline_ms}ms) must be shorter than timeouts.request_secs ({request_ms}ms)")]
    DeadlineNotBelowRequestTimeout {
        field: String,
        deadline_ms: u64,
        request_ms: u64,
    },

    #[error("route: {0}")]
    Route(DefinitionError),
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Dispatch deadlines must expire before the inbound request timeout.
fn check_deadline(
    errors: &mut Vec<ValidationError>,
    field: String,
    deadline_ms: u64,
    request_ms: u64,
) {
    if request_ms > 0 && deadline_ms >= request_ms {
        errors.push(ValidationError::DeadlineNotBelowRequestTimeout {
            field,
            deadline_ms,
            request_ms,
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::MustBePositive { field });
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_positive(&mut errors, "timeouts.downstream_call_ms", config.timeouts.downstream_call_ms);
    check_positive(&mut errors, "timeouts.fan_out_ms", config.timeouts.fan_out_ms);
    let request_ms = config.timeouts.request_secs.saturating_mul(1_000);
    check_deadline(
        &mut errors,
        "timeouts.fan_out_ms".to_string(),
        config.timeouts.fan_out_ms,
        request_ms,
    );
    for route in &config.routes {
        if let Some(timeout_ms) = route.timeout_ms {
            check_deadline(
                &mut errors,
                format!("routes.{}.timeout_ms", route.key),
                timeout_ms,
                request_ms,
            );
        }
    }
    check_positive(&mut errors, "store.fetch_timeout_secs", config.store.fetch_timeout_secs);
    check_positive(&mut errors, "retries.max_attempts", config.retries.max_attempts as u64);
    check_positive(
        &mut errors,
        "circuit_breaker.failure_threshold",
        config.circuit_breaker.failure_threshold as u64,
    );
    check_positive(&mut errors, "limits.max_body_bytes", config.limits.max_body_bytes as u64);

    if !(0.0..=1.0).contains(&config.retries.budget_ratio) {
        errors.push(ValidationError::InvalidBudgetRatio);
    }

    let format = config.observability.log_format.to_ascii_lowercase();
    if format != "text" && format != "json" {
        errors.push(ValidationError::InvalidLogFormat);
    }

    if config.store.source == SourceKind::Http {
        match config.store.url.as_deref() {
            None => errors.push(ValidationError::MissingSourceUrl),
            Some(raw) if Url::parse(raw).is_err() => {
                errors.push(ValidationError::InvalidSourceUrl(raw.to_string()))
            }
            Some(_) => {}
        }
    }

    if let Err(route_errors) = RouteDefinitionSet::build(0, config.routes.clone()) {
        errors.extend(route_errors.into_iter().map(ValidationError::Route));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{DownstreamTarget, RouteDefinition};

    fn route(key: &str, path: &str) -> RouteDefinition {
        RouteDefinition {
            key: key.to_string(),
            upstream_path_template: path.to_string(),
            upstream_methods: vec![],
            upstream_host: None,
            downstream: vec![DownstreamTarget::new("svc", 80, "/")],
            aggregation: Default::default(),
            priority: 0,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.timeouts.fan_out_ms = 0;
        config.circuit_breaker.failure_threshold = 0;
        config.observability.log_format = "xml".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MustBePositive {
            field: "timeouts.fan_out_ms"
        }));
        assert!(errors.contains(&ValidationError::InvalidLogFormat));
    }

    #[test]
    fn test_deadlines_must_beat_request_timeout() {
        let mut config = GatewayConfig::default();
        config.timeouts.request_secs = 5;
        config.timeouts.fan_out_ms = 5_000;
        let mut slow = route("slow", "/slow");
        slow.timeout_ms = Some(8_000);
        let mut fast = route("fast", "/fast");
        fast.timeout_ms = Some(1_000);
        config.routes = vec![slow, fast];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DeadlineNotBelowRequestTimeout {
                    field: "timeouts.fan_out_ms".to_string(),
                    deadline_ms: 5_000,
                    request_ms: 5_000,
                },
                ValidationError::DeadlineNotBelowRequestTimeout {
                    field: "routes.slow.timeout_ms".to_string(),
                    deadline_ms: 8_000,
                    request_ms: 5_000,
                },
            ]
        );

        config.timeouts.fan_out_ms = 4_999;
        config.routes.truncate(0);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_http_source_requires_url() {
        let mut config = GatewayConfig::default();
        config.store.source = SourceKind::Http;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MissingSourceUrl]
        );

        config.store.url = Some("::not a url".to_string());
        assert!(matches!(
            validate_config(&config).unwrap_err()[0],
            ValidationError::InvalidSourceUrl(_)
        ));

        config.store.url = Some("http://routes.internal/v1/routes".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_static_routes_are_validated() {
        let mut config = GatewayConfig::default();
        config.routes = vec![route("a", "/items/{id}"), route("b", "/items/{key}")];

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::Route(DefinitionError::Conflict { .. })
        ));
    }
}
