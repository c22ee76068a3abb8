use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use rand::Rng;
use serde::Deserialize;
use tracing::{error, info, warn};

use parley_db::directory;
use parley_types::api::LandingResponse;
use parley_types::models::User;

use crate::error::ApiError;
use crate::session::{self, SESSION_COOKIE, claims_from_headers, cookie, removal};
use crate::state::{AppState, blocking};

pub const STATE_COOKIE: &str = "parley_oauth_state";
pub const FLASH_COOKIE: &str = "parley_flash";

/// How long a login attempt may take between /auth/login and the callback.
const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /: authenticated users go to their conversations; everyone else
/// gets the landing payload and any pending flash message.
pub async fn index(State(state): State<AppState>, headers: HeaderMap, jar: CookieJar) -> Response {
    if claims_from_headers(&headers, &state.jwt_secret).is_some() {
        return Redirect::to("/conversations").into_response();
    }

    let flash = jar.get(FLASH_COOKIE).and_then(|c| decode_flash(c.value()));
    let jar = jar.remove(removal(FLASH_COOKIE));

    (
        jar,
        Json(LandingResponse {
            authenticated: false,
            flash,
            login_url: "/auth/login".into(),
        }),
    )
        .into_response()
}

/// GET /auth/login: redirect to the identity provider with a fresh CSRF state.
pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Redirect), ApiError> {
    let csrf = generate_state();
    {
        let mut pending = state.pending_states.lock().map_err(|_| ApiError::Internal)?;
        let now = Instant::now();
        pending.retain(|_, issued| now.duration_since(*issued) < STATE_TTL);
        pending.insert(csrf.clone(), now);
    }

    let url = state.oauth.authorization_url(&csrf)?;
    Ok((jar.add(cookie(STATE_COOKIE, csrf)), Redirect::to(&url)))
}

/// GET /auth/callback: finish the OAuth flow. Every failure lands on `/`
/// with a flash message.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> (CookieJar, Redirect) {
    let browser_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(removal(STATE_COOKIE));

    let user = match complete_login(&state, query, browser_state).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Login failed: {}", e);
            return (with_flash(jar, &e.to_string()), Redirect::to("/"));
        }
    };

    match session::create_token(&state.jwt_secret, user.id, &user.name) {
        Ok(token) => {
            info!("{} ({}) logged in", user.name, user.id);
            (jar.add(cookie(SESSION_COOKIE, token)), Redirect::to("/conversations"))
        }
        Err(e) => {
            error!("Failed to issue session token: {}", e);
            (with_flash(jar, "Could not start a session. Please try again."), Redirect::to("/"))
        }
    }
}

async fn complete_login(
    state: &AppState,
    query: CallbackQuery,
    browser_state: Option<String>,
) -> Result<User, ApiError> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or(error);
        return Err(ApiError::UpstreamIdentity(format!(
            "Error during authentication: {}",
            detail
        )));
    }

    let returned = query.state.ok_or(ApiError::AuthStateMismatch)?;
    if browser_state.as_deref() != Some(returned.as_str()) || !take_pending_state(state, &returned)? {
        return Err(ApiError::AuthStateMismatch);
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::UpstreamIdentity("The identity provider returned no authorization code.".into()))?;

    let access_token = state.oauth.exchange_code(&code).await?;
    let identity = state.oauth.fetch_identity(&access_token).await?;

    blocking(state, move |s| {
        let _guard = s.login_guard.lock().map_err(|_| parley_db::Error::LockPoisoned)?;
        directory::find_or_create(
            &s.db,
            &identity.external_id,
            &identity.profile,
            &identity.access_token,
        )
    })
    .await
}

/// Consume a pending state. False if unknown or expired.
fn take_pending_state(state: &AppState, value: &str) -> Result<bool, ApiError> {
    let mut pending = state.pending_states.lock().map_err(|_| ApiError::Internal)?;
    Ok(pending
        .remove(value)
        .is_some_and(|issued| issued.elapsed() < STATE_TTL))
}

/// GET /auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(removal(SESSION_COOKIE));
    (with_flash(jar, "You have been logged out."), Redirect::to("/"))
}

fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    B64.encode(bytes)
}

fn with_flash(jar: CookieJar, message: &str) -> CookieJar {
    jar.add(cookie(FLASH_COOKIE, B64.encode(message)))
}

fn decode_flash(value: &str) -> Option<String> {
    B64.decode(value).ok().and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_unique_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn flash_roundtrips() {
        let encoded = B64.encode("OAuth state mismatch. Please try again.");
        assert_eq!(
            decode_flash(&encoded).as_deref(),
            Some("OAuth state mismatch. Please try again.")
        );
        assert_eq!(decode_flash("%%%"), None);
    }
}
