//! Authorization-code flow against the Spotify accounts service.
//!
//! The access token is persisted as JSON in a cache file so a restart
//! keeps the user logged in, and is refreshed shortly before it expires.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::SpotifyError;

pub const ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
pub const SCOPES: &[&str] = &["playlist-modify-private", "playlist-modify-public"];

/// Seconds before expiry at which a token is treated as stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Application credentials registered with Spotify.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Token as returned by the accounts service, stamped with its absolute expiry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: i64,
}

impl Token {
    fn is_expiring(&self) -> bool {
        self.expires_at - Utc::now().timestamp() < EXPIRY_MARGIN_SECS
    }
}

/// Owns the OAuth2 exchange and the on-disk token cache.
#[derive(Clone)]
pub struct AuthManager {
    client: Client,
    credentials: Arc<Credentials>,
    accounts_base: String,
    cache_path: PathBuf,
    token: Arc<RwLock<Option<Token>>>,
}

impl AuthManager {
    pub fn with_accounts_base(
        client: Client,
        credentials: Credentials,
        cache_path: impl Into<PathBuf>,
        accounts_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
            accounts_base: accounts_base.into(),
            cache_path: cache_path.into(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// URL the user is sent to in order to grant access.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}",
            self.accounts_base,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.credentials.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
        )
    }

    /// Returns a usable token if one is cached, refreshing it when it is about to expire.
    pub async fn cached_token(&self) -> Result<Option<Token>, SpotifyError> {
        let fresh = self.token.read().await.clone().filter(|t| !t.is_expiring());
        if fresh.is_some() {
            return Ok(fresh);
        }

        // held across load and refresh so concurrent callers refresh once
        let mut guard = self.token.write().await;
        if guard.is_none() {
            *guard = self.load_cache().await;
        }
        let Some(token) = guard.clone() else {
            return Ok(None);
        };
        if !token.is_expiring() {
            return Ok(Some(token));
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            tracing::debug!("cached token expired and has no refresh token");
            return Ok(None);
        };

        let mut refreshed = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await
            .map_err(|e| match e {
                SpotifyError::Authorization(msg) => SpotifyError::Refresh(msg),
                other => other,
            })?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        self.write_cache(&refreshed).await?;
        *guard = Some(refreshed.clone());
        tracing::info!("refreshed access token, expires in {}s", refreshed.expires_in);
        Ok(Some(refreshed))
    }

    /// Exchanges an authorization code for a token and writes it to the cache.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, SpotifyError> {
        let token = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ])
            .await?;
        self.write_cache(&token).await?;
        *self.token.write().await = Some(token.clone());
        tracing::info!("obtained access token, expires in {}s", token.expires_in);
        Ok(token)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Token, SpotifyError> {
        let auth = base64::engine::general_purpose::STANDARD.encode(
            format!("{}:{}", self.credentials.client_id, self.credentials.client_secret).as_bytes(),
        );

        let res = self
            .client
            .post(format!("{}/api/token", self.accounts_base))
            .header("Authorization", format!("Basic {}", auth))
            .form(params)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SpotifyError::Authorization(format!("{} - {}", status, body)));
        }

        let mut token: Token = res.json().await?;
        token.expires_at = Utc::now().timestamp() + token.expires_in as i64;
        Ok(token)
    }

    async fn load_cache(&self) -> Option<Token> {
        let content = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("couldn't read token cache {}: {}", self.cache_path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("ignoring malformed token cache {}: {}", self.cache_path.display(), e);
                None
            }
        }
    }

    async fn write_cache(&self, token: &Token) -> Result<(), SpotifyError> {
        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.cache_path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{routing::post, Form, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::spotify::spawn_mock;

    fn credentials() -> Credentials {
        Credentials {
            client_id: "my-client".into(),
            client_secret: "shh".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
        }
    }

    async fn token_endpoint(Form(params): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
        match params.get("grant_type").map(String::as_str) {
            Some("authorization_code") => Json(json!({
                "access_token": format!("access-{}", params["code"]),
                "token_type": "Bearer",
                "scope": "playlist-modify-private playlist-modify-public",
                "expires_in": 3600,
                "refresh_token": "refresh-1",
            })),
            _ => Json(json!({
                "access_token": "refreshed",
                "token_type": "Bearer",
                "expires_in": 3600,
            })),
        }
    }

    #[test]
    fn authorize_url_carries_client_and_redirect() {
        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), "unused", ACCOUNTS_BASE);
        let url = auth.authorize_url();

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=my-client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=playlist-modify-private%20playlist-modify-public"));
    }

    #[tokio::test]
    async fn no_cache_file_means_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), dir.path().join("cache"), ACCOUNTS_BASE);

        assert!(auth.cached_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        std::fs::write(&path, "not json").unwrap();
        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, ACCOUNTS_BASE);

        assert!(auth.cached_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exchanged_token_is_cached_on_disk() {
        let base = spawn_mock(Router::new().route("/api/token", post(token_endpoint))).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        auth.exchange_code("abc").await.unwrap();

        // a fresh manager only sees what was written to disk
        let reloaded = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        let token = reloaded.cached_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "access-abc");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn rejected_code_is_an_authorization_error() {
        let app = Router::new().route(
            "/api/token",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "invalid_grant") }),
        );
        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        let err = auth.exchange_code("bogus").await.unwrap_err();

        assert!(matches!(err, SpotifyError::Authorization(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_keeps_refresh_token() {
        let base = spawn_mock(Router::new().route("/api/token", post(token_endpoint))).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        let stale = Token {
            access_token: "old".into(),
            token_type: "Bearer".into(),
            scope: String::new(),
            expires_in: 3600,
            refresh_token: Some("keep-me".into()),
            expires_at: Utc::now().timestamp() - 10,
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        let token = auth.cached_token().await.unwrap().unwrap();

        assert_eq!(token.access_token, "refreshed");
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
        let on_disk: Token = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.access_token, "refreshed");
    }

    fn stale_token(refresh_token: Option<&str>) -> Token {
        Token {
            access_token: "old".into(),
            token_type: "Bearer".into(),
            scope: String::new(),
            expires_in: 3600,
            refresh_token: refresh_token.map(String::from),
            expires_at: Utc::now().timestamp() - 10,
        }
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_means_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        std::fs::write(&path, serde_json::to_string(&stale_token(None)).unwrap()).unwrap();

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, ACCOUNTS_BASE);

        assert!(auth.cached_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_is_kept_in_memory_after_first_read() {
        let base = spawn_mock(Router::new().route("/api/token", post(token_endpoint))).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let writer = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        writer.exchange_code("abc").await.unwrap();

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        assert!(auth.cached_token().await.unwrap().is_some());

        std::fs::remove_file(&path).unwrap();
        let token = auth.cached_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "access-abc");
    }

    #[tokio::test]
    async fn rejected_refresh_is_a_refresh_error() {
        let app = Router::new().route(
            "/api/token",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "invalid_grant") }),
        );
        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        std::fs::write(&path, serde_json::to_string(&stale_token(Some("revoked"))).unwrap()).unwrap();

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        let err = auth.cached_token().await.unwrap_err();

        assert!(matches!(err, SpotifyError::Refresh(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/api/token",
            post(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Json(json!({ "access_token": "refreshed", "token_type": "Bearer", "expires_in": 3600 }))
            }),
        );
        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        std::fs::write(&path, serde_json::to_string(&stale_token(Some("r"))).unwrap()).unwrap();

        let auth = AuthManager::with_accounts_base(Client::new(), credentials(), &path, &base);
        let (a, b, c) = tokio::join!(auth.cached_token(), auth.cached_token(), auth.cached_token());

        for token in [a, b, c] {
            assert_eq!(token.unwrap().unwrap().access_token, "refreshed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
