//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RouteSource (file / HTTP repository)
//!     → store.rs (fetch, validate, atomic swap of Arc<RouteDefinitionSet>)
//!
//! Incoming Request (path, method, host)
//!     → store.snapshot()
//!     → resolver.rs (rank matching templates)
//!     → Return: RouteMatch or NotFound
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; a reload builds a whole new set
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input and snapshot always match the same route

pub mod definition;
pub mod matcher;
pub mod resolver;
pub mod source;
pub mod store;
pub mod template;

pub use definition::{
    AggregationStrategy, CompiledRoute, DefinitionError, DownstreamTarget, KeyConflict,
    RouteDefinition, RouteDefinitionSet,
};
pub use resolver::{NotFound, RouteMatch, RouteResolver};
pub use source::{FileRouteSource, HttpRouteSource, RouteSource, StaticRouteSource};
pub use store::{RouteDefinitionStore, StoreError};
