//! Feature modules implementing the mboxcsv API
//!
//! Each feature is a vertical slice with its own commands (write operations),
//! queries (read operations), and routes. Transport concerns stay in each
//! feature's `routes.rs`; command and query handlers are plain functions over
//! [`AppState`] so they can be driven directly from tests.
//!
//! # Features
//!
//! - **uploads**: the chunked upload protocol, the legacy single-shot path,
//!   job status polling, and export download

pub mod uploads;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::state::AppState;

/// Build the complete application router
///
/// Feature routes are mounted under `/api/v1`; `/` and `/health` answer at
/// the root for load balancers and uptime checks.
pub fn router(state: AppState) -> Router {
    let cors = middleware::cors_layer(&state.config.cors);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(
            "/api/v1",
            uploads::uploads_routes(&state.config.upload).with_state(state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "mboxcsv",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
