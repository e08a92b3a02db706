//! Backends that provide route definitions.
//!
//! # Sources
//! - `FileRouteSource`: TOML or JSON file (by extension). Pointed at the
//!   gateway config file itself this is the static, file-configured mode.
//! - `HttpRouteSource`: remote route repository returning JSON.
//! - `StaticRouteSource`: in-memory list, for embedding and tests.
//!
//! Every source maps transport failures to `SourceUnavailable` and payload
//! failures to `Malformed`; validation happens later in the store.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::routing::definition::RouteDefinition;
use crate::routing::store::StoreError;

/// A pluggable provider of route definitions.
#[async_trait]
pub trait RouteSource: Send + Sync + fmt::Debug {
    /// Fetch the complete, current list of definitions.
    async fn fetch(&self) -> Result<Vec<RouteDefinition>, StoreError>;

    /// Human-readable location, for logs and the admin API.
    fn describe(&self) -> String;
}

/// A route document: exactly one `routes` key.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteDocument {
    routes: Vec<RouteDefinition>,
}

/// Accepted payload shapes: `{ "routes": [...] }` or a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoutePayload {
    Document(RouteDocument),
    List(Vec<RouteDefinition>),
}

impl RoutePayload {
    fn into_routes(self) -> Vec<RouteDefinition> {
        match self {
            RoutePayload::Document(document) => document.routes,
            RoutePayload::List(routes) => routes,
        }
    }
}

/// Parse a JSON route payload.
///
/// An object that is not a route document (an error body, a misspelled
/// `routes` key) is `Malformed`, never an empty route list.
pub fn parse_json(bytes: &[u8]) -> Result<Vec<RouteDefinition>, StoreError> {
    serde_json::from_slice::<RoutePayload>(bytes)
        .map(RoutePayload::into_routes)
        .map_err(|_| {
            StoreError::Malformed(
                "expected {\"routes\": [...]} or a list of route definitions".to_string(),
            )
        })
}

/// Parse a TOML document; only its `[[routes]]` tables are read, but they
/// must be present (`routes = []` declares an intentionally empty set).
pub fn parse_toml(content: &str) -> Result<Vec<RouteDefinition>, StoreError> {
    #[derive(Deserialize)]
    struct Document {
        routes: Vec<RouteDefinition>,
    }

    toml::from_str::<Document>(content)
        .map(|d| d.routes)
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Reads definitions from a file on every fetch.
#[derive(Debug, Clone)]
pub struct FileRouteSource {
    path: PathBuf,
}

impl FileRouteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_json(&self) -> bool {
        self.path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RouteSource for FileRouteSource {
    async fn fetch(&self) -> Result<Vec<RouteDefinition>, StoreError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::SourceUnavailable(format!("{}: {}", self.path.display(), e)))?;

        if self.is_json() {
            parse_json(content.as_bytes())
        } else {
            parse_toml(&content)
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Queries a route repository over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRouteSource {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpRouteSource {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RouteSource for HttpRouteSource {
    async fn fetch(&self) -> Result<Vec<RouteDefinition>, StoreError> {
        let response = self
            .client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StoreError::SourceUnavailable(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::SourceUnavailable(format!(
                "{}: repository returned {}",
                self.url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| StoreError::SourceUnavailable(format!("{}: {}", self.url, e)))?;

        parse_json(&body)
    }

    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }
}

/// An in-memory list of definitions that can be replaced at runtime.
#[derive(Debug, Default)]
pub struct StaticRouteSource {
    routes: Mutex<Vec<RouteDefinition>>,
}

impl StaticRouteSource {
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        Self {
            routes: Mutex::new(routes),
        }
    }

    /// Replace the definitions returned by subsequent fetches.
    pub fn replace(&self, routes: Vec<RouteDefinition>) {
        *self.routes.lock().unwrap_or_else(PoisonError::into_inner) = routes;
    }
}

#[async_trait]
impl RouteSource for StaticRouteSource {
    async fn fetch(&self) -> Result<Vec<RouteDefinition>, StoreError> {
        Ok(self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
