use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessagePayload;

/// Events sent over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered
    Ready { user_id: Uuid, name: String },

    /// Informational: a user opened a live connection
    UserConnected { user_id: Uuid },

    /// A message was posted to a conversation the recipient belongs to
    NewMessage(MessagePayload),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate a connection that carried no session at upgrade time
    Identify { token: String },
}
