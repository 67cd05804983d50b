use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::spotify::SpotifyError;

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    Spotify(String),
    Authorization(String),
    BadRequest(String),
    Internal(String),
}

impl From<SpotifyError> for AppError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::Authorization(_) => AppError::Authorization(err.to_string()),
            SpotifyError::Cache(_) => AppError::Internal(err.to_string()),
            // a stale login is the server's problem, not the request's
            SpotifyError::Refresh(_) => AppError::Spotify(err.to_string()),
            _ => AppError::Spotify(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Spotify(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Authorization(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        tracing::error!(status = %status, "{}", message);
        (status, Json(json!({ "error": message }))).into_response()
    }
}
