//! `GET /gateway`: upgrade to the live channel.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;

use parley_db::directory;
use parley_gateway::connection::{self, verify_token};
use parley_types::api::Claims;

use crate::session::claims_from_headers;
use crate::state::{AppState, blocking};

#[derive(Debug, Default, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// A session in the cookie, bearer header or `?token=` registers the socket
/// immediately; otherwise the client must `identify` first.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let claims = claims_from_headers(&headers, &state.jwt_secret).or_else(|| {
        query
            .token
            .as_deref()
            .and_then(|token| verify_token(&state.jwt_secret, token))
    });

    ws.on_upgrade(move |socket| serve_socket(state, socket, claims))
}

async fn serve_socket(state: AppState, mut socket: WebSocket, claims: Option<Claims>) {
    let claims = match claims {
        Some(claims) => claims,
        None => match connection::identify(&mut socket, &state.jwt_secret).await {
            Some(claims) => claims,
            None => {
                warn!("WebSocket client failed to identify, closing");
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        },
    };

    let name = display_name(&state, &claims).await;
    connection::handle_connection(socket, state.dispatcher.clone(), claims.sub, name).await;
}

/// The directory's current name. Tokens live for weeks, so the name they
/// carry may be stale; it is only used when the lookup comes up empty.
async fn display_name(state: &AppState, claims: &Claims) -> String {
    let user_id = claims.sub;
    match blocking(state, move |s| directory::get(&s.db, user_id)).await {
        Ok(Some(user)) if !user.name.is_empty() => user.name,
        Ok(_) => claims.name.clone(),
        Err(e) => {
            warn!("Name lookup for {} failed, using session name: {}", user_id, e);
            claims.name.clone()
        }
    }
}
