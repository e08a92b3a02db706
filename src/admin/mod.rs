//! Admin API.
//!
//! Served on its own listener and protected by a bearer token.
//!
//! ```text
//! GET  /admin/status          gateway version, snapshot version, route count
//! GET  /admin/routes          active route definitions
//! POST /admin/routes/reload   reload routes from the source
//! GET  /admin/circuits        per-target circuit breaker state
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::resilience::CircuitBreakers;
use crate::routing::RouteDefinitionStore;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<RouteDefinitionStore>,
    pub breakers: Arc<CircuitBreakers>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(
        store: Arc<RouteDefinitionStore>,
        breakers: Arc<CircuitBreakers>,
        api_key: &str,
    ) -> Self {
        Self {
            store,
            breakers,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/reload", post(reload_routes))
        .route("/admin/circuits", get(get_circuits))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
