//! Session tokens (JWT) carried in a cookie or a bearer header.

use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use parley_gateway::connection::verify_token;
use parley_types::api::Claims;

pub const SESSION_COOKIE: &str = "parley_session";

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Claims from `Authorization: Bearer`, else from the session cookie.
pub fn claims_from_headers(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        return verify_token(secret, token);
    }

    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(SESSION_COOKIE)?;
    verify_token(secret, cookie.value())
}

pub(crate) fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub(crate) fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_roundtrips_through_header_and_cookie() {
        let id = Uuid::new_v4();
        let token = create_token("s3cret", id, "Ada").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let claims = claims_from_headers(&headers, "s3cret").unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.name, "Ada");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token)).unwrap(),
        );
        assert_eq!(claims_from_headers(&headers, "s3cret").unwrap().sub, id);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token("s3cret", Uuid::new_v4(), "Ada").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert!(claims_from_headers(&headers, "other").is_none());
        assert!(claims_from_headers(&HeaderMap::new(), "s3cret").is_none());
    }
}
