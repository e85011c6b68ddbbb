use axum::{extract::DefaultBodyLimit, Extension, Router};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

use crate::state::AppState;

pub mod room;
pub mod ws;

const BODY_LIMIT: usize = 64 * 1024;

pub fn router() -> Router {
    Router::new()
        .merge(room::router())
        .merge(ws::router())
}

pub fn app(state: AppState) -> Router {
    router()
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
}
