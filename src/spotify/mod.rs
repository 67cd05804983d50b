//! Spotify Web API client.
//!
//! Uses the Authorization Code flow so playlists can be created on behalf
//! of the logged-in user.

mod auth;
mod error;

use std::future::Future;
use std::path::PathBuf;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use auth::AuthManager;
pub use auth::{Credentials, Token};
pub use error::SpotifyError;

const API_BASE: &str = "https://api.spotify.com/v1";

/// Operations the route handlers need from Spotify.
pub trait SpotifyApi: Clone + Send + Sync + 'static {
    fn authorize_url(&self) -> String;

    fn cached_token(&self) -> impl Future<Output = Result<Option<Token>, SpotifyError>> + Send;

    fn exchange_code(&self, code: &str) -> impl Future<Output = Result<(), SpotifyError>> + Send;

    /// URI of the best match for a free-text track query.
    fn search_track(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<String>, SpotifyError>> + Send;

    /// Track URIs recommended from the given seed track URIs, in returned order.
    fn recommendations(
        &self,
        seeds: &[String],
        limit: u32,
    ) -> impl Future<Output = Result<Vec<String>, SpotifyError>> + Send;

    fn current_user_id(&self) -> impl Future<Output = Result<String, SpotifyError>> + Send;

    fn create_playlist(
        &self,
        user_id: &str,
        playlist: &NewPlaylist,
    ) -> impl Future<Output = Result<Playlist, SpotifyError>> + Send;

    fn add_items(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> impl Future<Output = Result<(), SpotifyError>> + Send;
}

/// Spotify API client sharing one token cache across requests.
#[derive(Clone)]
pub struct SpotifyClient {
    client: Client,
    auth: AuthManager,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(credentials: Credentials, cache_path: impl Into<PathBuf>) -> Self {
        Self::with_endpoints(credentials, cache_path, auth::ACCOUNTS_BASE, API_BASE)
    }

    pub fn with_endpoints(
        credentials: Credentials,
        cache_path: impl Into<PathBuf>,
        accounts_base: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let client = Client::new();
        let auth = AuthManager::with_accounts_base(client.clone(), credentials, cache_path, accounts_base);
        Self {
            client,
            auth,
            api_base: api_base.into(),
        }
    }

    async fn bearer(&self) -> Result<String, SpotifyError> {
        let token = self
            .auth
            .cached_token()
            .await?
            .ok_or(SpotifyError::NotAuthenticated)?;
        Ok(format!("Bearer {}", token.access_token))
    }
}

async fn ensure_success(res: Response) -> Result<Response, SpotifyError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(SpotifyError::Api { status, body })
}

/// `spotify:track:<id>` -> `<id>`; bare ids pass through.
fn track_id(uri: &str) -> &str {
    uri.rsplit(':').next().unwrap_or(uri)
}

impl SpotifyApi for SpotifyClient {
    fn authorize_url(&self) -> String {
        self.auth.authorize_url()
    }

    async fn cached_token(&self) -> Result<Option<Token>, SpotifyError> {
        self.auth.cached_token().await
    }

    async fn exchange_code(&self, code: &str) -> Result<(), SpotifyError> {
        self.auth.exchange_code(code).await.map(|_| ())
    }

    async fn search_track(&self, query: &str) -> Result<Option<String>, SpotifyError> {
        let url = format!(
            "{}/search?q={}&type=track&limit=10",
            self.api_base,
            urlencoding::encode(query),
        );

        let res = self
            .client
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        let body: SearchResponse = ensure_success(res).await?.json().await?;

        let first = body.tracks.items.into_iter().next();
        match &first {
            Some(t) => tracing::debug!("'{}' resolved to '{}' ({})", query, t.name, t.uri),
            None => tracing::debug!("no track found for '{}'", query),
        }
        Ok(first.map(|t| t.uri))
    }

    async fn recommendations(&self, seeds: &[String], limit: u32) -> Result<Vec<String>, SpotifyError> {
        let ids = seeds.iter().map(|s| track_id(s)).collect::<Vec<_>>().join(",");
        let url = format!(
            "{}/recommendations?seed_tracks={}&limit={}",
            self.api_base,
            urlencoding::encode(&ids),
            limit,
        );

        let res = self
            .client
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        let body: RecommendationsResponse = ensure_success(res).await?.json().await?;

        tracing::debug!("{} recommendations from {} seeds", body.tracks.len(), seeds.len());
        Ok(body.tracks.into_iter().map(|t| t.uri).collect())
    }

    async fn current_user_id(&self) -> Result<String, SpotifyError> {
        let res = self
            .client
            .get(format!("{}/me", self.api_base))
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        let user: User = ensure_success(res).await?.json().await?;
        Ok(user.id)
    }

    async fn create_playlist(&self, user_id: &str, playlist: &NewPlaylist) -> Result<Playlist, SpotifyError> {
        let url = format!("{}/users/{}/playlists", self.api_base, urlencoding::encode(user_id));

        let res = self
            .client
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(playlist)
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), SpotifyError> {
        let url = format!("{}/playlists/{}/tracks", self.api_base, urlencoding::encode(playlist_id));

        let res = self
            .client
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&AddItemsRequest { uris })
            .send()
            .await?;
        ensure_success(res).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: TracksPage,
}

#[derive(Deserialize)]
struct TracksPage {
    items: Vec<Track>,
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    tracks: Vec<Track>,
}

#[derive(Deserialize)]
struct User {
    id: String,
}

#[derive(Serialize)]
struct AddItemsRequest<'a> {
    uris: &'a [String],
}

/// A Spotify track (simplified).
#[derive(Clone, Debug, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub name: String,
    pub uri: String,
}

/// Body of a create-playlist request.
#[derive(Clone, Debug, Serialize)]
pub struct NewPlaylist {
    pub name: String,
    pub public: bool,
    pub collaborative: bool,
    pub description: String,
}

/// A playlist as returned on creation.
#[derive(Clone, Debug, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

/// Serves `app` on an ephemeral local port and returns its base URL.
#[cfg(test)]
pub(crate) async fn spawn_mock(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}
