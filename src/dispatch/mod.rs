//! Downstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RouteMatch + InboundRequest
//!     → request.rs (per-target DownstreamRequest, forwarded headers)
//!     → dispatcher.rs (breaker, retries, fan-out under deadline)
//!     → client.rs (DownstreamClient: hyper-util pooled client)
//!     → Vec<DownstreamCallResult>
//! ```

pub mod client;
pub mod dispatcher;
pub mod request;

pub use client::{ClientError, DownstreamClient, DownstreamRequest, DownstreamResponse, HyperClient};
pub use dispatcher::{CallError, DownstreamCallResult, DownstreamDispatcher};
pub use request::InboundRequest;
