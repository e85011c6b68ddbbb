use axum::{http::StatusCode, response::IntoResponse};
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("Room not found: {0}")]
    NotFound(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("DB: {0}")]
    Db(#[from] sqlx::Error),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            AppErr::Bad(msg)      => (StatusCode::BAD_REQUEST, msg),
            AppErr::NotFound(id)  => (StatusCode::NOT_FOUND, format!("room {id} does not exist")),
            other                 => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (code, body).into_response()
    }
}

/* ── 小助手：把任何 error 轉成 Bad ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }

/// A client action that could not be applied. Never tears down the
/// connection; the sender gets an `ERROR` frame instead.
#[derive(thiserror::Error, Debug)]
pub enum ActionError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown action `{0}`")]
    Unknown(String),

    #[error("{action}: invalid payload: {reason}")]
    Payload { action: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let res = AppErr::NotFound("r1".into()).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = bad("empty room id").into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let res = AppErr::Config("BIND_ADDR".into()).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
