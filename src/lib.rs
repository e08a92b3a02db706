//! Dynamic API gateway: route resolution, downstream fan-out and response
//! aggregation.

pub mod admin;
pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
