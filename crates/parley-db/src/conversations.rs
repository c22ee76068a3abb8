//! Conversation ledger: metadata, membership, per-user indexes and the
//! denormalized last-message summary.
//!
//! Multi-key writes here are not transactional. A conversation saved
//! before a participant's index update fails stays fetchable by id but is
//! missing from that user's list.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use parley_types::models::{Conversation, LastMessage};

use crate::store::{self, Store, conversation_key};
use crate::{Error, Result, directory};

pub fn create<S: Store + ?Sized>(
    store: &S,
    participants: &[Uuid],
    title: Option<String>,
) -> Result<Conversation> {
    let mut members: Vec<Uuid> = Vec::with_capacity(participants.len());
    for id in participants {
        if !members.contains(id) {
            members.push(*id);
        }
    }
    if members.len() < 2 {
        return Err(Error::Validation(
            "a conversation needs at least two distinct participants".into(),
        ));
    }

    let conversation = Conversation {
        id: Uuid::new_v4(),
        participants: members,
        title: title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        last_message: None,
        created_at: Utc::now(),
    };
    save(store, &conversation)?;

    for user_id in &conversation.participants {
        let Some(mut user) = directory::get(store, *user_id)? else {
            warn!(
                "Participant {} of conversation {} has no user record",
                user_id, conversation.id
            );
            continue;
        };
        if user.add_conversation(conversation.id) {
            directory::save(store, &user)?;
        }
    }

    Ok(conversation)
}

pub fn get<S: Store + ?Sized>(store: &S, id: Uuid) -> Result<Option<Conversation>> {
    store::load(store, &conversation_key(id))
}

fn save<S: Store + ?Sized>(store: &S, conversation: &Conversation) -> Result<()> {
    store::save(store, &conversation_key(conversation.id), conversation)
}

/// Membership check. Every read or write of a conversation's contents on
/// behalf of a user goes through here first.
pub fn require_participant<S: Store + ?Sized>(
    store: &S,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Conversation> {
    let conversation = get(store, conversation_id)?.ok_or_else(|| Error::NotFound {
        entity: "conversation",
        id: conversation_id.to_string(),
    })?;

    if !conversation.is_participant(user_id) {
        return Err(Error::AccessDenied {
            user_id,
            conversation_id,
        });
    }
    Ok(conversation)
}

/// The user's conversations, most recently active first. Dangling index
/// entries are skipped.
pub fn list_for_user<S: Store + ?Sized>(store: &S, user_id: Uuid) -> Result<Vec<Conversation>> {
    let Some(user) = directory::get(store, user_id)? else {
        return Ok(vec![]);
    };

    let mut conversations = Vec::with_capacity(user.conversation_ids.len());
    for id in &user.conversation_ids {
        match get(store, *id)? {
            Some(conv) if conv.is_participant(user_id) => conversations.push(conv),
            Some(_) => warn!("User {} indexes conversation {} without membership", user_id, id),
            None => warn!("User {} indexes missing conversation {}", user_id, id),
        }
    }

    // Stable: equal timestamps keep index order.
    conversations.sort_by(|a, b| b.effective_timestamp().cmp(&a.effective_timestamp()));
    Ok(conversations)
}

/// Overwrites the summary and persists the whole record.
pub fn record_last_message<S: Store + ?Sized>(
    store: &S,
    conversation: &mut Conversation,
    summary: LastMessage,
) -> Result<()> {
    conversation.last_message = Some(summary);
    save(store, conversation)
}
