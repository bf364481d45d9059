//! Read-only HTTP endpoints for the web UI and tooling.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::catalog::FPS_DEFAULT_GAME;
use crate::protocol::LobbySummary;
use crate::state::AppState;
use crate::types::MapName;

/// GET /api/cardColors
pub async fn card_colors(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.card_colors.read().await.clone())
}

/// GET /api/lobbies
///
/// Sets and the ordered team map serialize as arrays; team order is
/// preserved join order.
pub async fn lobbies(State(state): State<Arc<AppState>>) -> Json<Vec<LobbySummary>> {
    Json(state.lobby_summaries().await)
}

/// GET /api/mapPool
pub async fn map_pool(State(state): State<Arc<AppState>>) -> Json<Vec<MapName>> {
    Json(
        state
            .catalog
            .read()
            .await
            .fps_map_pool(FPS_DEFAULT_GAME)
            .unwrap_or_default(),
    )
}

/// GET /api/coinFlip
pub async fn coin_flip(State(state): State<Arc<AppState>>) -> Json<bool> {
    Json(*state.coin_flip_default.read().await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEnv {
    pub websocket_url: String,
}

/// GET /api/runtime-env
pub async fn runtime_env() -> Json<RuntimeEnv> {
    Json(RuntimeEnv {
        websocket_url: std::env::var("PUBLIC_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:4000/ws".to_string()),
    })
}
