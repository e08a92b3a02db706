//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a downstream target:
//!     → circuit_breaker.rs (fail fast if the target's circuit is open)
//!     → per-attempt timeout (tokio::time::timeout in the dispatcher)
//!     → On failure: retries.rs (check if retryable and within budget)
//!         → backoff.rs (exponential delay with jitter), then retry
//!     → circuit_breaker.rs (record outcome)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for safe requests (GET, HEAD, etc.)
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakers, CircuitOpen, CircuitState};
pub use retries::{RetryBudget, RetryPolicy};
