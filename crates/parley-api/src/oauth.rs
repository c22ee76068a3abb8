//! Identity provider client: authorization URL, code exchange, profile fetch.
//!
//! Defaults target LinkedIn's v2 API; every endpoint is configurable.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use parley_db::directory::Profile;

use crate::error::ApiError;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
pub const DEFAULT_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
pub const DEFAULT_API_BASE_URL: &str = "https://api.linkedin.com/v2";
pub const DEFAULT_SCOPES: &str = "r_liteprofile r_emailaddress";

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
}

/// A successfully resolved external login.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub external_id: String,
    pub profile: Profile,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, ApiError> {
        let scope = self.config.scopes.join(" ");
        let url = reqwest::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| {
            warn!("Invalid authorize URL {}: {}", self.config.authorize_url, e);
            ApiError::Internal
        })?;

        Ok(url.into())
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("Token exchange failed: {}", e);
                ApiError::UpstreamIdentity("Failed to complete sign-in with the identity provider.".into())
            })?;

        let token: TokenResponse = response.json().await.map_err(|e| {
            warn!("Malformed token response: {}", e);
            ApiError::UpstreamIdentity("Failed to complete sign-in with the identity provider.".into())
        })?;

        Ok(token.access_token)
    }

    /// Fetch the profile (and, best effort, the email) behind a token.
    pub async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, ApiError> {
        let profile = self
            .get_json(&format!("{}/me", self.config.api_base_url), access_token)
            .await
            .unwrap_or(Value::Null);

        let (external_id, name) = parse_profile(&profile).ok_or_else(|| {
            ApiError::UpstreamIdentity(
                "Failed to retrieve profile information from the identity provider.".into(),
            )
        })?;

        let email = self
            .get_json(
                &format!(
                    "{}/emailAddress?q=members&projection=(elements*(handle~))",
                    self.config.api_base_url
                ),
                access_token,
            )
            .await
            .as_ref()
            .and_then(parse_email);

        Ok(ExternalIdentity {
            external_id,
            profile: Profile {
                name: Some(name),
                email,
                avatar_url: None,
            },
            access_token: access_token.to_string(),
        })
    }

    async fn get_json(&self, url: &str, access_token: &str) -> Option<Value> {
        let result = async {
            self.http
                .get(url)
                .bearer_auth(access_token)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        }
        .await;

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Identity provider request to {} failed: {}", url, e);
                None
            }
        }
    }
}

/// `(id, display name)` from a `/me` response. The id is required.
pub fn parse_profile(profile: &Value) -> Option<(String, String)> {
    let id = profile.get("id")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }

    let part = |field: &str| profile.get(field).and_then(Value::as_str).unwrap_or("");
    let name = format!("{} {}", part("localizedFirstName"), part("localizedLastName"))
        .trim()
        .to_string();

    Some((id.to_string(), name))
}

/// First email handle from an `emailAddress` response, if any.
pub fn parse_email(response: &Value) -> Option<String> {
    response
        .get("elements")?
        .get(0)?
        .get("handle~")?
        .get("emailAddress")?
        .as_str()
        .map(str::to_string)
}
