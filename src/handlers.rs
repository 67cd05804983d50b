//! HTTP handlers: login redirect, OAuth callback and playlist generation.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::spotify::{NewPlaylist, SpotifyApi};
use crate::templates;

/// Number of recommended tracks appended to the resolved ones.
pub const RECOMMENDATION_LIMIT: u32 = 20;

/// Query parameters Spotify appends when redirecting back.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// GET /health - Health check.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET / - Song form, or a redirect to Spotify when not logged in.
pub async fn index<S: SpotifyApi>(State(spotify): State<S>) -> Result<Response, AppError> {
    if spotify.cached_token().await?.is_none() {
        return Ok(found(&spotify.authorize_url()));
    }
    Ok(templates::index().into_response())
}

/// GET /callback - Exchange the authorization code and go back home.
pub async fn callback<S: SpotifyApi>(
    State(spotify): State<S>,
    Query(params): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let Some(code) = params.code else {
        let reason = params.error.unwrap_or_else(|| "missing 'code'".into());
        return Err(AppError::BadRequest(format!("authorization not granted: {}", reason)));
    };

    spotify.exchange_code(&code).await?;
    Ok(found("/"))
}

/// POST /generate_playlist - Build a playlist from the submitted songs plus recommendations.
///
/// The body is read as ordered pairs so repeated `song_name` fields keep
/// their submission order.
pub async fn generate_playlist<S: SpotifyApi>(
    State(spotify): State<S>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let song_names: Vec<String> = fields
        .into_iter()
        .filter(|(key, _)| key == "song_name")
        .map(|(_, value)| value)
        .collect();

    if song_names.iter().all(|s| s.is_empty()) {
        return Ok("Enter at least one song".into_response());
    }

    let mut track_uris = Vec::new();
    for name in song_names.iter().filter(|s| !s.is_empty()) {
        if let Some(uri) = spotify.search_track(name).await? {
            track_uris.push(uri);
        }
    }

    // counts resolved tracks, not submitted titles
    if track_uris.len() < 2 {
        tracing::debug!("only {} of {} songs resolved", track_uris.len(), song_names.len());
        return Ok("Enter at least two songs".into_response());
    }

    let recommended = spotify.recommendations(&track_uris, RECOMMENDATION_LIMIT).await?;
    track_uris.extend(recommended);

    let new_playlist = NewPlaylist {
        name: format!("Playlist generated from {} songs", song_names.len()),
        public: false,
        collaborative: false,
        description: String::new(),
    };
    let user_id = spotify.current_user_id().await?;
    let playlist = spotify.create_playlist(&user_id, &new_playlist).await?;
    spotify.add_items(&playlist.id, &track_uris).await?;

    tracing::info!(
        playlist_id = %playlist.id,
        tracks = track_uris.len(),
        "created playlist '{}'",
        new_playlist.name
    );

    let url = playlist
        .external_urls
        .spotify
        .ok_or_else(|| AppError::Spotify(format!("playlist {} has no public URL", playlist.id)))?;
    Ok(templates::playlist(&url).into_response())
}

/// Build the app router.
pub fn router<S: SpotifyApi>() -> Router<S> {
    Router::new()
        .route("/", get(index::<S>))
        .route("/callback", get(callback::<S>))
        .route("/generate_playlist", post(generate_playlist::<S>))
        .route("/health", get(health))
}
