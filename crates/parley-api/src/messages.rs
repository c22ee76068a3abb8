use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use parley_db::{conversations, directory, messages};
use parley_types::api::{Claims, MessagePayload, SendMessageRequest};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Upper bound on one history page.
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    messages::DEFAULT_LIMIT
}

/// GET /api/messages/{conversation_id}?limit=&offset=
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    query: Result<Query<MessageQuery>, QueryRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let user_id = claims.sub;
    let limit = query.limit.min(MAX_PAGE_SIZE);
    let offset = query.offset;

    let page = blocking(&state, move |s| {
        conversations::require_participant(&s.db, conversation_id, user_id)?;
        messages::range(&s.db, conversation_id, limit, offset)
    })
    .await?;

    Ok(Json(page))
}

/// POST /api/send-message
///
/// Membership check, append, summary update, then fan-out. The sequence is
/// not atomic: concurrent sends may briefly leave the summary behind the log.
/// Not idempotent either; a client retry produces a second message.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let (conversation_id, content) = validate(req)?;
    let sender_id = claims.sub;

    let (conversation, message, sender) = blocking(&state, move |s| {
        let mut conversation = conversations::require_participant(&s.db, conversation_id, sender_id)?;
        let sender = directory::get(&s.db, sender_id)?.ok_or_else(|| parley_db::Error::NotFound {
            entity: "user",
            id: sender_id.to_string(),
        })?;

        let message = messages::append(&s.db, conversation_id, sender_id, &content)?;
        conversations::record_last_message(&s.db, &mut conversation, message.summary())?;
        Ok((conversation, message, sender))
    })
    .await?;

    info!(
        "{} ({}) sent message {} to conversation {}",
        sender.name, sender.id, message.id, conversation.id
    );

    let reached = state
        .dispatcher
        .broadcast_new_message(&conversation, &message, &sender)
        .await;
    debug!("Message {} pushed to {} live connection(s)", message.id, reached);

    Ok(Json(MessagePayload::new(message, &sender)))
}

fn validate(req: SendMessageRequest) -> Result<(Uuid, String), ApiError> {
    let missing = || ApiError::Validation("Missing required fields".into());

    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(missing)?;
    let content = req.content.filter(|c| !c.trim().is_empty()).ok_or_else(missing)?;

    Ok((parse_conversation_id(&conversation_id)?, content))
}

pub(crate) fn parse_conversation_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Validation("Invalid conversation_id".into()))
}
