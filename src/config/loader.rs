//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::config::SourceKind;
    use crate::routing::AggregationStrategy;

    const SAMPLE: &str = r#"
[listener]
bind_address = "127.0.0.1:8080"

[store]
poll_interval_secs = 30

[retries]
max_attempts = 2

[[routes]]
key = "order-details"
upstream_path_template = "/orders/{id}"
upstream_methods = ["GET"]

[routes.aggregation]
type = "merge-json"

[[routes.downstream]]
key = "order"
host = "orders"
port = 8080
path_template = "/v1/orders/{id}"

[[routes.downstream]]
key = "customer"
host = "users"
port = 8080
path_template = "/v1/users/by-order/{id}"
"#;

    #[test]
    fn test_load_sample_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8080");
        assert_eq!(config.store.source, SourceKind::File);
        assert_eq!(config.store.poll_interval_secs, 30);
        assert_eq!(config.retries.max_attempts, 2);
        assert_eq!(config.timeouts.downstream_call_ms, 5_000);

        assert_eq!(config.routes.len(), 1);
        let route = &config.routes[0];
        assert_eq!(route.downstream.len(), 2);
        assert!(matches!(route.aggregation, AggregationStrategy::MergeJson { .. }));
    }

    #[test]
    fn test_shipped_gateway_toml_is_valid() {
        let config = parse_config(include_str!("../../gateway.toml")).unwrap();
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].key, "dashboard");
        assert_eq!(config.routes[1].timeout_ms, Some(2_000));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.routes.is_empty());
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_config("[listener\nbind_address = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_error_is_reported() {
        let err = parse_config("[retries]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/gateway.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
