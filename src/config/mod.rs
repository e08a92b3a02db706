//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Route definitions are not part of the static config lifecycle:
//!     watcher.rs detects a route file change
//!     → RouteDefinitionStore::reload()
//!     → atomic swap of Arc<RouteDefinitionSet>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only route definitions hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, GatewayConfig, LimitsConfig, ListenerConfig,
    ObservabilityConfig, RetryConfig, SourceKind, StoreConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::RouteFileWatcher;
