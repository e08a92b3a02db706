//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! startup.rs:   config → route source → initial snapshot (version 1)
//!               → poller / file watcher / SIGHUP reloader
//! signals.rs:   SIGINT/SIGTERM → Shutdown::trigger
//!               SIGHUP → RouteDefinitionStore::reload
//! shutdown.rs:  broadcast to listeners and background reload tasks
//! ```
//!
//! # Design Decisions
//! - A gateway that cannot load its initial routes does not start
//! - Later reload failures keep the last-known-good snapshot

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
