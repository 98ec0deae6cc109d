//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is the shared [`ScanOrchestrator`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::engine::scanner::ScanOrchestrator;
use crate::types::{
    Agent, AgentError, AgentPatch, EnrichedItem, Favorite, FavoriteError, NewAgent, ScanError,
    ScanRecord, Stats,
};

pub type AppState = Arc<ScanOrchestrator>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    pub new_items: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Domain errors mapped onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Favorite(#[from] FavoriteError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::Agent(AgentError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, json!({ "error": message }))
            }
            ApiError::Agent(AgentError::Invalid(_)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Scan(ScanError::Cooldown { remaining_secs }) => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": message, "remainingSecs": remaining_secs }),
            ),
            ApiError::Scan(ScanError::Busy) => {
                (StatusCode::TOO_MANY_REQUESTS, json!({ "error": message }))
            }
            ApiError::Favorite(FavoriteError::AlreadyExists(_)) => {
                (StatusCode::CONFLICT, json!({ "error": message }))
            }
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn get_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online",
        timestamp: Utc::now(),
    })
}

pub async fn list_agents(State(scanner): State<AppState>) -> Json<Vec<Agent>> {
    Json(scanner.list_agents().await)
}

pub async fn create_agent(
    State(scanner): State<AppState>,
    Json(draft): Json<NewAgent>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let agent = scanner.add_agent(draft).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn update_agent(
    State(scanner): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<AgentPatch>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(scanner.update_agent(&id, patch).await?))
}

pub async fn toggle_agent(
    State(scanner): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(scanner.toggle_agent(&id).await?))
}

pub async fn delete_agent(
    State(scanner): State<AppState>,
    Path(id): Path<String>,
) -> Json<SuccessResponse> {
    scanner.delete_agent(&id).await;
    Json(SuccessResponse { success: true })
}

pub async fn trigger_scan(State(scanner): State<AppState>) -> Result<Json<ScanResponse>, ApiError> {
    let summary = scanner.scan_on_demand().await?;
    Ok(Json(ScanResponse {
        success: true,
        message: "Scan complete".into(),
        new_items: summary.new_items,
    }))
}

pub async fn get_stats(State(scanner): State<AppState>) -> Json<Stats> {
    Json(scanner.stats().await)
}

pub async fn get_history(State(scanner): State<AppState>) -> Json<Vec<ScanRecord>> {
    Json(scanner.history().await)
}

pub async fn list_favorites(State(scanner): State<AppState>) -> Json<Vec<Favorite>> {
    Json(scanner.list_favorites().await)
}

pub async fn add_favorite(
    State(scanner): State<AppState>,
    Json(item): Json<EnrichedItem>,
) -> Result<(StatusCode, Json<Favorite>), ApiError> {
    let favorite = scanner.add_favorite(item).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove_favorite(
    State(scanner): State<AppState>,
    Path(id): Path<String>,
) -> Json<SuccessResponse> {
    scanner.remove_favorite(&id).await;
    Json(SuccessResponse { success: true })
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
