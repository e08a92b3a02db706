//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the route source selected by the configuration
//! - Perform the initial route load
//! - Start the reload triggers (poller, file watcher, SIGHUP)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A relative route file path is resolved against the config file's directory

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use url::Url;

use crate::config::{GatewayConfig, RouteFileWatcher, SourceKind};
use crate::lifecycle::Shutdown;
use crate::routing::{FileRouteSource, HttpRouteSource, RouteDefinitionStore, RouteSource, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store.url is missing or invalid")]
    InvalidSourceUrl,

    #[error("initial route load failed: {0}")]
    InitialLoad(#[from] StoreError),

    #[error("route file watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// Route file for a file source: `store.path` relative to the config file,
/// or the config file itself.
pub fn route_file_path(config: &GatewayConfig, config_path: &Path) -> PathBuf {
    match config.store.path.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                config_path
                    .parent()
                    .map(|dir| dir.join(path))
                    .unwrap_or_else(|| path.to_path_buf())
            }
        }
        None => config_path.to_path_buf(),
    }
}

pub fn build_route_source(
    config: &GatewayConfig,
    config_path: &Path,
) -> Result<Arc<dyn RouteSource>, StartupError> {
    match config.store.source {
        SourceKind::File => Ok(Arc::new(FileRouteSource::new(route_file_path(
            config,
            config_path,
        )))),
        SourceKind::Http => {
            let url = config
                .store
                .url
                .as_deref()
                .and_then(|raw| Url::parse(raw).ok())
                .ok_or(StartupError::InvalidSourceUrl)?;
            Ok(Arc::new(HttpRouteSource::new(
                url,
                Duration::from_secs(config.store.fetch_timeout_secs),
            )))
        }
    }
}

/// Build the source and load the first route set.
pub async fn initialize_store(
    config: &GatewayConfig,
    config_path: &Path,
) -> Result<Arc<RouteDefinitionStore>, StartupError> {
    let source = build_route_source(config, config_path)?;
    tracing::info!(source = %source.describe(), "Loading route definitions");
    let store = RouteDefinitionStore::initialize(source).await?;
    Ok(Arc::new(store))
}

/// Handles that keep reload triggers alive.
#[derive(Default)]
pub struct ReloadTriggers {
    _watcher: Option<RecommendedWatcher>,
}

/// Start the configured reload triggers.
pub fn spawn_reload_triggers(
    config: &GatewayConfig,
    config_path: &Path,
    store: &Arc<RouteDefinitionStore>,
    shutdown: &Shutdown,
) -> Result<ReloadTriggers, StartupError> {
    let mut triggers = ReloadTriggers::default();

    if config.store.poll_interval_secs > 0 {
        let interval = Duration::from_secs(config.store.poll_interval_secs);
        tokio::spawn(store.clone().run_poller(interval, shutdown.subscribe()));
    }

    if config.store.source == SourceKind::File && config.store.watch {
        let (watcher, mut rx) = RouteFileWatcher::new(&route_file_path(config, config_path));
        triggers._watcher = Some(watcher.run()?);

        let store = store.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    trigger = rx.recv() => {
                        if trigger.is_none() {
                            break;
                        }
                        // Coalesce bursts of events from a single save.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        while rx.try_recv().is_ok() {}
                        let _ = store.reload().await;
                    }
                    _ = stop.recv() => break,
                }
            }
        });
    }

    #[cfg(unix)]
    {
        if let Err(e) = crate::lifecycle::signals::spawn_sighup_reloader(store.clone(), shutdown) {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler, signal reloads disabled");
        }
    }

    Ok(triggers)
}
