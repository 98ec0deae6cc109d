//! Dashboard: Axum web server for the scanner control surface.
//!
//! Serves a JSON API and a WebSocket event stream.
//! CORS enabled for local development.

pub mod routes;
pub mod ws;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use routes::AppState;

/// Bind the dashboard port and serve in a background task.
///
/// Fails if the port cannot be bound; serving errors are logged.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route(
            "/api/agents",
            get(routes::list_agents).post(routes::create_agent),
        )
        .route(
            "/api/agents/:id",
            put(routes::update_agent).delete(routes::delete_agent),
        )
        .route("/api/agents/:id/toggle", patch(routes::toggle_agent))
        .route("/api/scan", post(routes::trigger_scan))
        .route("/api/stats", get(routes::get_stats))
        .route("/api/history", get(routes::get_history))
        .route(
            "/api/favorites",
            get(routes::list_favorites).post(routes::add_favorite),
        )
        .route("/api/favorites/:id", delete(routes::remove_favorite))
        .route("/health", get(routes::health))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
