use std::env;
use std::path::PathBuf;

use crate::spotify::Credentials;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CACHE_PATH: &str = ".spotifycache-username";

/// Application configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cache_path: PathBuf,
    pub credentials: Credentials,
}

impl Config {
    /// Missing Spotify credentials are not fatal here; they surface as an
    /// authorization failure once the user tries to log in.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let cache_path = env::var("SPOTIFY_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_PATH));

        let credentials = Credentials {
            client_id: required("SPOTIFY_CLIENT_ID"),
            client_secret: required("SPOTIFY_CLIENT_SECRET"),
            redirect_uri: required("SPOTIFY_REDIRECT_URI"),
        };

        Self {
            port,
            cache_path,
            credentials,
        }
    }
}

fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        tracing::warn!("{} is not set", name);
        String::new()
    })
}
