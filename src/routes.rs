use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    config::Config,
    stations::{
        poller::StationBoard,
        types::{Reading, Station},
    },
    suggest::{Suggestion, SuggestionService},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub board: StationBoard,
    pub suggestions: Arc<SuggestionService>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsRequest {
    pub stations: Vec<Station>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub ai_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub station_id: String,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ai_enabled: state.config.has_ai_credential(),
    })
}

pub async fn list_stations(State(state): State<AppState>) -> Json<Vec<Station>> {
    Json(state.board.stations().await)
}

pub async fn station_history(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    match state.board.history(&station_id).await {
        Some(readings) => Ok(Json(HistoryResponse {
            station_id,
            readings,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Suggestions for the latest polled snapshot.
pub async fn current_suggestions(State(state): State<AppState>) -> Json<SuggestionsResponse> {
    let stations = state.board.stations().await;
    let suggestions = state.suggestions.get_suggestions(&stations).await;

    Json(SuggestionsResponse {
        suggestions,
        generated_at: chrono::Utc::now(),
    })
}

/// Suggestions for readings supplied by the caller.
pub async fn suggest_for_stations(
    State(state): State<AppState>,
    Json(request): Json<SuggestionsRequest>,
) -> Json<SuggestionsResponse> {
    let suggestions = state.suggestions.get_suggestions(&request.stations).await;

    Json(SuggestionsResponse {
        suggestions,
        generated_at: chrono::Utc::now(),
    })
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stations", get(list_stations))
        .route("/stations/:station_id/history", get(station_history))
        .route(
            "/suggestions",
            get(current_suggestions).post(suggest_for_stations),
        )
        .with_state(state)
}
