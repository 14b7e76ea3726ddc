//! CareLink HTTP Server
//!
//! Exposes the identity, scheduling, records and reporting services as a
//! JSON API under `/api/v1`:
//! - Bearer-token authentication resolved per request
//! - Uniform success and failure envelopes
//! - Request tracing through `tower-http`

pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use carelink_shared::ServiceContext;
use identity::{AuthConfig, AuthService};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::error::ApiResult;
use crate::response::ApiResponse;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub ctx: ServiceContext,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(ctx: ServiceContext, auth_config: &AuthConfig) -> Self {
        let auth = Arc::new(AuthService::new(ctx.clone(), auth_config));
        Self { ctx, auth }
    }
}

/// The complete application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", routes::api())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the global subscriber; `RUST_LOG` overrides `default_filter`
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn health(State(state): State<AppState>) -> ApiResult<ApiResponse<HealthStatus>> {
    state.ctx.db.ping().await?;
    Ok(ApiResponse::ok(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
