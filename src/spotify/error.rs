use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to the accounts service or the Web API.
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Spotify API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("token refresh failed: {0}")]
    Refresh(String),
    #[error("no cached access token, log in first")]
    NotAuthenticated,
    #[error("token cache error: {0}")]
    Cache(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}
