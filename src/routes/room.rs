use axum::{extract::Path, routing::{get, post}, Extension, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    error::{bad, AppResult},
    state::AppState,
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/room/:room_id/create", post(create))
        .route("/room/:room_id/exists", get(exists))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "message": "Sync room server is running"}))
}

async fn create(
    Extension(state): Extension<AppState>,
    Path(room): Path<String>,
) -> AppResult<Json<Value>> {
    if room.trim().is_empty() { return Err(bad("empty room id")); }
    state.store.get_or_create(&room).await?;
    info!(room, "room created");
    Ok(Json(json!({"success": true, "room_id": room})))
}

async fn exists(
    Extension(state): Extension<AppState>,
    Path(room): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(json!({"exists": state.store.exists(&room).await?})))
}
