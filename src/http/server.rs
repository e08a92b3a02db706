//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing, limits, timeout, request ID)
//! - Bind server to listener with graceful shutdown
//! - Drive each request through resolve → dispatch → aggregate
//! - Observability (metrics, correlation IDs)

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::aggregate::{AggregatorRegistry, ResponseAggregator};
use crate::config::GatewayConfig;
use crate::dispatch::{DownstreamClient, DownstreamDispatcher};
use crate::http::request::{self, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::{aggregated_response, GatewayError};
use crate::observability::metrics;
use crate::resilience::{CircuitBreakers, RetryBudget, RetryPolicy};
use crate::routing::{RouteDefinitionStore, RouteResolver};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RouteDefinitionStore>,
    pub resolver: RouteResolver,
    pub dispatcher: Arc<DownstreamDispatcher>,
    pub aggregator: Arc<ResponseAggregator>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        config: &GatewayConfig,
        store: Arc<RouteDefinitionStore>,
        client: Arc<dyn DownstreamClient>,
        registry: AggregatorRegistry,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakers::new(config.circuit_breaker.clone()));
        let retry_budget = Arc::new(RetryBudget::new(config.retries.budget_ratio, 100));
        let dispatcher = DownstreamDispatcher::new(
            client,
            breakers,
            RetryPolicy::new(config.retries.clone()),
            retry_budget,
            &config.timeouts,
        );

        Self {
            store,
            resolver: RouteResolver::new(),
            dispatcher: Arc::new(dispatcher),
            aggregator: Arc::new(ResponseAggregator::new(registry)),
            max_body_bytes: config.limits.max_body_bytes,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakers> {
        self.dispatcher.breakers()
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, state: AppState) -> Self {
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main gateway handler.
/// Resolves the route, calls its downstream targets and aggregates the results.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request::request_id(request.headers()).unwrap_or_default();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let host = request::request_host(&request);

    let snapshot = state.store.snapshot();
    let matched = match state
        .resolver
        .resolve(&path, &method, host.as_deref(), &snapshot)
    {
        Ok(matched) => matched,
        Err(not_found) => {
            tracing::debug!(request_id = %request_id, method = %method, path = %path, "No route matched");
            metrics::record_request("none", 404, start_time);
            return GatewayError::from(not_found).into_response();
        }
    };
    drop(snapshot);

    let route_key = matched.key().to_string();
    tracing::debug!(
        request_id = %request_id,
        route = %route_key,
        version = matched.version,
        "Route matched"
    );

    let inbound = match request::into_inbound(request, state.max_body_bytes).await {
        Ok(inbound) => inbound,
        Err(e) => {
            metrics::record_request(&route_key, e.status().as_u16(), start_time);
            return e.into_response();
        }
    };

    let results = state.dispatcher.dispatch(&matched, &inbound).await;

    match state
        .aggregator
        .aggregate(matched.route.aggregation(), results)
    {
        Ok(aggregated) => {
            if let Some(partial) = &aggregated.partial {
                let failed: Vec<&str> = partial.iter().map(|f| f.target_key.as_str()).collect();
                tracing::warn!(
                    request_id = %request_id,
                    route = %route_key,
                    failed_targets = ?failed,
                    "Partial aggregation"
                );
                metrics::record_partial_aggregation(&route_key);
            }
            metrics::record_request(&route_key, aggregated.status.as_u16(), start_time);
            aggregated_response(aggregated)
        }
        Err(e) => {
            let error = GatewayError::from(e);
            let status = error.status();
            tracing::warn!(
                request_id = %request_id,
                route = %route_key,
                status = status.as_u16(),
                error = %error,
                "Request failed"
            );
            metrics::record_request(&route_key, status.as_u16(), start_time);
            error.into_response()
        }
    }
}
