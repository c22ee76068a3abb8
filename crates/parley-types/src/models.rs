use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A locally known user, keyed by `id` and joined to the identity provider
/// through the immutable `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    /// Provider access token from the most recent login.
    pub credential: String,
    /// Advisory back-references; `Conversation::participants` is authoritative.
    #[serde(default)]
    pub conversation_ids: Vec<Uuid>,
}

impl User {
    /// Adds a conversation to the index. Returns false if it was already there.
    pub fn add_conversation(&mut self, conversation_id: Uuid) -> bool {
        if self.conversation_ids.contains(&conversation_id) {
            return false;
        }
        self.conversation_ids.push(conversation_id);
        true
    }
}

/// Denormalized projection of the newest message, kept on the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Fixed membership set, at least two users, in first-seen order.
    pub participants: Vec<Uuid>,
    pub title: Option<String>,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// Timestamp used to rank conversations: last activity, else creation.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }

    /// Participants other than `user_id`, in membership order.
    pub fn others(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.iter().copied().filter(move |id| *id != user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn summary(&self) -> LastMessage {
        LastMessage {
            content: self.content.clone(),
            sender_id: self.sender_id,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conversation(created: i64, last: Option<i64>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            participants: vec![Uuid::new_v4(), Uuid::new_v4()],
            title: None,
            last_message: last.map(|ts| LastMessage {
                content: "hey".into(),
                sender_id: Uuid::new_v4(),
                timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            }),
            created_at: Utc.timestamp_opt(created, 0).unwrap(),
        }
    }

    #[test]
    fn message_bytes_roundtrip() {
        let msg = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi \u{1f44b}".into(),
            timestamp: Utc::now(),
            is_read: false,
        };

        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn malformed_message_bytes_fail() {
        assert!(Message::from_bytes(b"{\"id\": 3}").is_err());
    }

    #[test]
    fn effective_timestamp_prefers_last_message() {
        assert_eq!(conversation(5, None).effective_timestamp().timestamp(), 5);
        assert_eq!(conversation(5, Some(20)).effective_timestamp().timestamp(), 20);
    }

    #[test]
    fn others_excludes_caller() {
        let conv = conversation(0, None);
        let me = conv.participants[0];
        let others: Vec<Uuid> = conv.others(me).collect();
        assert_eq!(others, vec![conv.participants[1]]);
    }

    #[test]
    fn user_without_index_defaults_empty() {
        let json = format!(
            r#"{{"id":"{}","external_id":"li-1","name":"Ada","email":null,"avatar_url":null,"credential":"tok"}}"#,
            Uuid::new_v4()
        );
        let user: User = serde_json::from_str(&json).unwrap();
        assert!(user.conversation_ids.is_empty());
    }

    #[test]
    fn add_conversation_is_idempotent() {
        let mut user: User = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "external_id": "li-1",
            "name": "Ada",
            "email": null,
            "avatar_url": null,
            "credential": "tok",
        }))
        .unwrap();
        let conv = Uuid::new_v4();
        assert!(user.add_conversation(conv));
        assert!(!user.add_conversation(conv));
        assert_eq!(user.conversation_ids, vec![conv]);
    }
}
