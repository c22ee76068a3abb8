//! HTTP-facing error type.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request fields
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    /// Caller is not a participant
    #[error("access denied")]
    AccessDenied,

    #[error("{0}")]
    NotFound(String),

    /// CSRF state on the OAuth callback did not match
    #[error("OAuth state mismatch. Please try again.")]
    AuthStateMismatch,

    /// The identity provider errored or returned an incomplete profile
    #[error("{0}")]
    UpstreamIdentity(String),

    #[error("stored data is corrupt")]
    CorruptData,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AuthStateMismatch => StatusCode::BAD_REQUEST,
            Self::UpstreamIdentity(_) => StatusCode::BAD_GATEWAY,
            Self::CorruptData | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<parley_db::Error> for ApiError {
    fn from(err: parley_db::Error) -> Self {
        use parley_db::Error as DbError;

        match err {
            DbError::Validation(msg) => Self::Validation(msg),
            DbError::AccessDenied { .. } => Self::AccessDenied,
            DbError::NotFound { entity, .. } => Self::NotFound(format!("{} not found", entity)),
            DbError::CorruptData { ref key, .. } => {
                error!("Corrupt record at {}: {}", key, err);
                Self::CorruptData
            }
            other => {
                error!("Store error: {}", other);
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn db_errors_map_to_taxonomy() {
        let denied = parley_db::Error::AccessDenied {
            user_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
        };
        assert_eq!(ApiError::from(denied).status(), StatusCode::FORBIDDEN);

        let missing = parley_db::Error::NotFound {
            entity: "conversation",
            id: "x".into(),
        };
        let err = ApiError::from(missing);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "conversation not found");

        let invalid = parley_db::Error::Validation("too few".into());
        assert_eq!(ApiError::from(invalid).status(), StatusCode::BAD_REQUEST);

        assert_eq!(
            ApiError::from(parley_db::Error::LockPoisoned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
