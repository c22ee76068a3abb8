use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ApiError;
use crate::session::claims_from_headers;
use crate::state::AppState;

/// Resolve the session and attach its `Claims` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(claims) = claims_from_headers(req.headers(), &state.jwt_secret) else {
        debug!("Rejected unauthenticated request to {}", req.uri().path());
        return Err(ApiError::Unauthorized);
    };

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
