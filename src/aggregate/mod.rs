//! Response aggregation subsystem.
//!
//! # Data Flow
//! ```text
//! DownstreamDispatcher results
//!     → aggregator.rs (strategy: none / merge-json / custom-key)
//!     → registry.rs (named aggregators for custom-key)
//!     → AggregatedResponse or AggregateError
//! ```

pub mod aggregator;
pub mod registry;

pub use aggregator::{AggregateError, AggregatedResponse, PartialFailure, ResponseAggregator};
pub use registry::{AggregatorRegistry, DefinedAggregator, JsonArrayAggregator};
