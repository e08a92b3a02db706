//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    Router,
};
use tokio::net::TcpListener;

use route_gateway::aggregate::AggregatorRegistry;
use route_gateway::config::GatewayConfig;
use route_gateway::dispatch::HyperClient;
use route_gateway::routing::{
    AggregationStrategy, DownstreamTarget, RouteDefinition, RouteDefinitionStore,
    StaticRouteSource,
};
use route_gateway::{AppState, HttpServer, Shutdown};

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let f = f.clone();
            async move {
                let (status, body) = f(MockRequest {
                    method,
                    uri,
                    headers,
                    body,
                })
                .await;
                (StatusCode::from_u16(status).unwrap(), body)
            }
        },
    );

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a mock backend that returns a fixed 200 response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, response.to_string()) }).await
}

/// Start a backend that counts hits and always answers `status`.
pub async fn start_counting_backend(status: u16, hits: Arc<AtomicU32>) -> SocketAddr {
    start_programmable_backend(move |_| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            (status, format!("status {status}"))
        }
    })
    .await
}

/// A backend that answers after `delay`.
pub async fn start_slow_backend(delay: Duration, response: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move {
        tokio::time::sleep(delay).await;
        (200, response.to_string())
    })
    .await
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn target(addr: SocketAddr, path: &str) -> DownstreamTarget {
    DownstreamTarget::new(addr.ip().to_string(), addr.port(), path)
}

pub fn route(
    key: &str,
    path: &str,
    methods: &[&str],
    downstream: Vec<DownstreamTarget>,
    aggregation: AggregationStrategy,
) -> RouteDefinition {
    RouteDefinition {
        key: key.to_string(),
        upstream_path_template: path.to_string(),
        upstream_methods: methods.iter().map(|m| m.to_string()).collect(),
        upstream_host: None,
        downstream,
        aggregation,
        priority: 0,
        timeout_ms: None,
    }
}

/// Config tuned for fast, deterministic tests.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.retries.enabled = false;
    config.timeouts.downstream_call_ms = 2_000;
    config.timeouts.fan_out_ms = 3_000;
    config.observability.metrics_enabled = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub source: Arc<StaticRouteSource>,
    pub store: Arc<RouteDefinitionStore>,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway serving `routes` from an in-memory source.
pub async fn start_gateway(config: GatewayConfig, routes: Vec<RouteDefinition>) -> TestGateway {
    let source = Arc::new(StaticRouteSource::new(routes));
    let store = Arc::new(
        RouteDefinitionStore::initialize(source.clone())
            .await
            .expect("initial routes must be valid"),
    );

    let client = Arc::new(HyperClient::new(
        Duration::from_millis(config.timeouts.downstream_call_ms),
        config.limits.max_response_bytes,
    ));
    let state = AppState::new(
        &config,
        store.clone(),
        client,
        AggregatorRegistry::with_builtins(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let mut stop = shutdown.subscribe();
    let server = HttpServer::new(&config, state.clone());
    tokio::spawn(async move {
        let _ = server
            .run(listener, async move {
                let _ = stop.recv().await;
            })
            .await;
    });

    TestGateway {
        addr,
        source,
        store,
        state,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
