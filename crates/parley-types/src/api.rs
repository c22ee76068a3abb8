use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, Message, User};

// -- JWT Claims --

/// Session claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Landing --

#[derive(Debug, Serialize, Deserialize)]
pub struct LandingResponse {
    pub authenticated: bool,
    pub flash: Option<String>,
    pub login_url: String,
}

// -- Participants --

/// Public display info for a user. Never carries the stored credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for ParticipantInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Everyone but the caller.
    pub participant_details: Vec<ParticipantInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub participants: Vec<ParticipantInfo>,
}

// -- Messages --

/// Both fields are optional at the wire level so that a missing field is
/// reported as a validation error rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A message plus the sender's display info, as returned to the sender and
/// pushed to the other participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(flatten)]
    pub message: Message,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
}

impl MessagePayload {
    pub fn new(message: Message, sender: &User) -> Self {
        Self {
            message,
            sender_name: sender.name.clone(),
            sender_avatar: sender.avatar_url.clone(),
        }
    }
}
