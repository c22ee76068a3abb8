//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use parley_api::oauth::{
    DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZE_URL, DEFAULT_SCOPES, DEFAULT_TOKEN_URL, OAuthConfig,
};

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub oauth: OAuthConfig,
}

impl Config {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PARLEY_HOST` | `0.0.0.0` |
    /// | `PARLEY_PORT` | `3000` |
    /// | `PARLEY_DB_PATH` | `parley.db` |
    /// | `PARLEY_JWT_SECRET` | dev secret |
    /// | `OAUTH_CLIENT_ID` | (required) |
    /// | `OAUTH_CLIENT_SECRET` | (required) |
    /// | `OAUTH_REDIRECT_URI` | (required) |
    /// | `OAUTH_AUTHORIZE_URL` | LinkedIn |
    /// | `OAUTH_TOKEN_URL` | LinkedIn |
    /// | `OAUTH_API_BASE_URL` | LinkedIn v2 |
    /// | `OAUTH_SCOPES` | `r_liteprofile r_emailaddress` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let host = var("PARLEY_HOST", "0.0.0.0");
        let port = var("PARLEY_PORT", "3000");
        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(format!("{}:{}", host, port)))?;

        let oauth = OAuthConfig {
            client_id: required("OAUTH_CLIENT_ID")?,
            client_secret: required("OAUTH_CLIENT_SECRET")?,
            redirect_uri: required("OAUTH_REDIRECT_URI")?,
            authorize_url: var("OAUTH_AUTHORIZE_URL", DEFAULT_AUTHORIZE_URL),
            token_url: var("OAUTH_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_base_url: var("OAUTH_API_BASE_URL", DEFAULT_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            scopes: var("OAUTH_SCOPES", DEFAULT_SCOPES)
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        };

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("PARLEY_DB_PATH", "parley.db")),
            jwt_secret: var("PARLEY_JWT_SECRET", DEV_JWT_SECRET),
            oauth,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {0}")]
    InvalidAddr(String),

    #[error("{0} environment variable is required")]
    Missing(&'static str),
}
