//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::extract::FromRef;
use axum::{middleware as axum_middleware, routing::get, Router};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::config::EngineConfig;
use crate::handlers::TransferEngine;

pub use routes::create_router;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: TransferEngine,
}

impl AppState {
    pub fn new(pool: PgPool, engine_config: EngineConfig) -> Self {
        Self {
            engine: TransferEngine::with_config(pool.clone(), engine_config),
            pool,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Build the full application: health check plus the authenticated API
pub fn build_router(state: AppState) -> Router {
    // Axum layers run in reverse order: logging -> auth -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn(middleware::auth_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
