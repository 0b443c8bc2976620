//! API — Axum web server exposing the user and bet operations.
//!
//! Serves a JSON API with one route per query/mutation.
//! CORS enabled for browser clients.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::{ApiState, AppState};

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API address {addr}"))?;
    info!(addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    info!("API server stopped");
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Bets
        .route("/api/bets", get(routes::list_bets).post(routes::place_bet))
        .route("/api/bets/best", get(routes::best_bets))
        .route("/api/bets/:id", get(routes::get_bet))
        // Users
        .route("/api/users", get(routes::list_users).post(routes::create_user))
        .route(
            "/api/users/:id",
            get(routes::get_user).delete(routes::delete_user),
        )
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
