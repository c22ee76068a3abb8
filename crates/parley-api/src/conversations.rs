use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use parley_db::{Store, conversations, directory, messages};
use parley_types::api::{
    Claims, ConversationDetail, ConversationSummary, CreateConversationRequest, ParticipantInfo,
};

use crate::error::ApiError;
use crate::messages::parse_conversation_id;
use crate::state::{AppState, blocking};

/// Display info for `ids`, skipping users without a record.
fn participant_infos<S: Store + ?Sized>(
    store: &S,
    ids: impl Iterator<Item = Uuid>,
) -> parley_db::Result<Vec<ParticipantInfo>> {
    let mut infos = Vec::new();
    for id in ids {
        if let Some(user) = directory::get(store, id)? {
            infos.push(ParticipantInfo::from(&user));
        }
    }
    Ok(infos)
}

/// GET /conversations, GET /api/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;

    let summaries = blocking(&state, move |s| {
        conversations::list_for_user(&s.db, user_id)?
            .into_iter()
            .map(|conversation| -> parley_db::Result<ConversationSummary> {
                let participant_details = participant_infos(&s.db, conversation.others(user_id))?;
                Ok(ConversationSummary {
                    conversation,
                    participant_details,
                })
            })
            .collect::<parley_db::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(summaries))
}

/// POST /api/conversations: the caller is always a participant.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut participants = vec![claims.sub];
    participants.extend(req.participant_ids);

    let conversation = blocking(&state, move |s| {
        for id in &participants {
            if directory::get(&s.db, *id)?.is_none() {
                return Err(parley_db::Error::NotFound {
                    entity: "user",
                    id: id.to_string(),
                });
            }
        }
        conversations::create(&s.db, &participants, req.title)
    })
    .await?;

    info!(
        "{} ({}) created conversation {} with {} participants",
        claims.name,
        claims.sub,
        conversation.id,
        conversation.participants.len()
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /conversation/{conversation_id}: conversation, newest page of
/// history and every participant.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let user_id = claims.sub;

    let detail = blocking(&state, move |s| {
        let conversation = conversations::require_participant(&s.db, conversation_id, user_id)?;
        let messages = messages::range(&s.db, conversation_id, messages::DEFAULT_LIMIT, 0)?;
        let participants = participant_infos(&s.db, conversation.participants.iter().copied())?;
        Ok(ConversationDetail {
            conversation,
            messages,
            participants,
        })
    })
    .await?;

    Ok(Json(detail))
}
