//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gateway_handler   → request count + latency per route key
//! dispatcher        → downstream call outcome + latency per target
//! circuit breakers  → circuit openings per target
//! route store       → reload outcome + installed snapshot version
//! aggregator        → partial merges per route key
//!     ↓
//! logging.rs (tracing events, text or JSON lines on stdout)
//! metrics.rs (Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Every request log line carries the request id and route key
//! - Recording before the exporter is installed is a no-op

pub mod logging;
pub mod metrics;
