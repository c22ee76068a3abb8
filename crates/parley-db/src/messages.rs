//! Append-only per-conversation message log, stored newest first.

use chrono::Utc;
use uuid::Uuid;

use parley_types::models::Message;

use crate::store::{Store, messages_key};
use crate::{Error, Result};

pub const DEFAULT_LIMIT: usize = 50;

/// Appends a new unread message. The caller has already passed the
/// membership check for `sender_id`.
pub fn append<S: Store + ?Sized>(
    store: &S,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> Result<Message> {
    let message = Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        timestamp: Utc::now(),
        is_read: false,
    };

    let bytes = message.to_bytes().map_err(Error::Encode)?;
    store.list_push(&messages_key(conversation_id), &bytes)?;
    Ok(message)
}

/// The `limit` newest messages starting `offset` entries back from the
/// newest one. A single undecodable entry fails the whole read.
pub fn range<S: Store + ?Sized>(
    store: &S,
    conversation_id: Uuid,
    limit: usize,
    offset: usize,
) -> Result<Vec<Message>> {
    let Some((start, stop)) = window(limit, offset) else {
        return Ok(vec![]);
    };

    let key = messages_key(conversation_id);
    store
        .list_range(&key, start, stop)?
        .iter()
        .map(|bytes| {
            Message::from_bytes(bytes).map_err(|source| Error::CorruptData {
                key: key.clone(),
                source,
            })
        })
        .collect()
}

/// Inclusive, non-negative `(start, stop)` list indexes for a page. `None`
/// when the page is empty or starts beyond any addressable entry. A stop
/// past the end is clamped by the store.
fn window(limit: usize, offset: usize) -> Option<(i64, i64)> {
    if limit == 0 {
        return None;
    }
    let start = i64::try_from(offset).ok()?;
    let span = i64::try_from(limit - 1).unwrap_or(i64::MAX);
    Some((start, start.saturating_add(span)))
}
