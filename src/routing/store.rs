//! Route definition store with atomic snapshot replacement.
//!
//! # Responsibilities
//! - Hold the active `RouteDefinitionSet` behind an `ArcSwap`
//! - Reload from the configured `RouteSource`, validate, and swap
//! - Keep the last-known-good snapshot when a reload fails
//!
//! # Design Decisions
//! - Readers call `snapshot()` which is a lock-free pointer load; an
//!   in-flight request keeps its `Arc` alive even after a swap
//! - Reloads are serialized by an async mutex which also owns the version
//!   counter, so versions are strictly increasing
//! - A failed reload never consumes a version

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::observability::metrics;
use crate::routing::definition::{DefinitionError, RouteDefinitionSet};
use crate::routing::source::RouteSource;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing source could not be reached.
    #[error("route source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source answered with something that is not a route document.
    #[error("malformed route payload: {0}")]
    Malformed(String),

    /// The definitions parsed but failed validation.
    #[error("invalid route definitions: {}", join_errors(.0))]
    Invalid(Vec<DefinitionError>),
}

fn join_errors(errors: &[DefinitionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct RouteDefinitionStore {
    current: ArcSwap<RouteDefinitionSet>,
    source: Arc<dyn RouteSource>,
    /// Last installed version; held for the duration of a reload.
    reload_lock: Mutex<u64>,
}

impl std::fmt::Debug for RouteDefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinitionStore")
            .field("source", &self.source.describe())
            .field("version", &self.current.load().version())
            .finish()
    }
}

impl RouteDefinitionStore {
    /// Create a store holding the empty set (version 0).
    pub fn new(source: Arc<dyn RouteSource>) -> Self {
        Self {
            current: ArcSwap::from_pointee(RouteDefinitionSet::empty()),
            source,
            reload_lock: Mutex::new(0),
        }
    }

    /// Create a store and perform the initial load.
    pub async fn initialize(source: Arc<dyn RouteSource>) -> Result<Self, StoreError> {
        let store = Self::new(source);
        store.reload().await?;
        Ok(store)
    }

    /// The active snapshot. Never blocks and never performs I/O.
    pub fn snapshot(&self) -> Arc<RouteDefinitionSet> {
        self.current.load_full()
    }

    pub fn source(&self) -> &dyn RouteSource {
        self.source.as_ref()
    }

    /// Fetch, validate and atomically install a new snapshot.
    ///
    /// Returns the installed version. On error the previous snapshot stays
    /// active.
    pub async fn reload(&self) -> Result<u64, StoreError> {
        let mut last_version = self.reload_lock.lock().await;

        let result = match self.source.fetch().await {
            Ok(definitions) => {
                RouteDefinitionSet::build(*last_version + 1, definitions).map_err(StoreError::Invalid)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(set) => {
                let version = set.version();
                let routes = set.len();
                self.current.store(Arc::new(set));
                *last_version = version;

                tracing::info!(
                    source = %self.source.describe(),
                    version,
                    routes,
                    "Route definitions reloaded"
                );
                metrics::record_reload("ok", version);
                Ok(version)
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    active_version = *last_version,
                    error = %e,
                    "Route reload failed, keeping last-known-good definitions"
                );
                metrics::record_reload("error", *last_version);
                Err(e)
            }
        }
    }

    /// Reload on a fixed interval until shutdown.
    pub async fn run_poller(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            source = %self.source.describe(),
            "Route poller starting"
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the initial load already happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.reload().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Route poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
