use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use parley_types::api::MessagePayload;
use parley_types::events::GatewayEvent;
use parley_types::models::{Conversation, Message, User};

/// Name of a user's broadcast group.
pub fn room_of(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

/// Process-scoped registry of live connections, grouped per user.
///
/// Connection lifecycle is owned by the connection layer, which calls
/// `on_connect` / `on_disconnect`. Delivery is at-most-once: an event for a
/// user with no open connection is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global informational events (user_connected); every connection listens
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Rooms: user_id -> (conn_id -> sender)
    rooms: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Register a connection in the user's room and announce it.
    /// Returns (conn_id, receiver).
    pub async fn on_connect(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .rooms
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);

        debug!("Connection {} joined {}", conn_id, room_of(user_id));

        // Fire-and-forget; no listeners is fine.
        let _ = self.inner.broadcast_tx.send(GatewayEvent::UserConnected { user_id });

        (conn_id, rx)
    }

    /// Remove one connection. Other connections of the same user stay.
    pub async fn on_disconnect(&self, user_id: Uuid, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(room) = rooms.get_mut(&user_id) {
            room.remove(&conn_id);
            if room.is_empty() {
                rooms.remove(&user_id);
            }
        }
        debug!("Connection {} left {}", conn_id, room_of(user_id));
    }

    /// Number of live connections in a user's room.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Push an event to every connection of one user. Returns how many
    /// connections accepted it. Closed connections are pruned.
    pub async fn send_to_room(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let mut rooms = self.inner.rooms.write().await;
        let Some(room) = rooms.get_mut(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        room.retain(|_, tx| {
            let ok = tx.send(event.clone()).is_ok();
            delivered += ok as usize;
            ok
        });
        if room.is_empty() {
            rooms.remove(&user_id);
        }
        delivered
    }

    /// Push a new message to every participant except the sender.
    /// Returns the number of connections reached.
    pub async fn broadcast_new_message(
        &self,
        conversation: &Conversation,
        message: &Message,
        sender: &User,
    ) -> usize {
        let event = GatewayEvent::NewMessage(MessagePayload::new(message.clone(), sender));

        let mut delivered = 0;
        for participant in conversation.others(sender.id) {
            delivered += self.send_to_room(participant, event.clone()).await;
        }

        debug!(
            "Message {} fanned out to {} connection(s) in conversation {}",
            message.id, delivered, conversation.id
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            external_id: format!("ext-{}", name),
            name: name.to_string(),
            email: None,
            avatar_url: Some(format!("https://img/{}.png", name)),
            credential: "tok".into(),
            conversation_ids: vec![],
        }
    }

    fn conversation(members: &[&User]) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            participants: members.iter().map(|u| u.id).collect(),
            title: None,
            last_message: None,
            created_at: Utc::now(),
        }
    }

    fn message(conv: &Conversation, sender: &User, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: conv.id,
            sender_id: sender.id,
            content: content.to_string(),
            timestamp: Utc::now(),
            is_read: false,
        }
    }

    #[test]
    fn room_names_are_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(room_of(id), format!("user:{}", id));
        assert_eq!(room_of(id), room_of(id));
    }

    #[tokio::test]
    async fn new_message_reaches_others_but_not_sender() {
        let dispatcher = Dispatcher::new();
        let (a, b) = (user("a"), user("b"));
        let conv = conversation(&[&a, &b]);

        let (_, mut a_rx) = dispatcher.on_connect(a.id).await;
        let (_, mut b_rx) = dispatcher.on_connect(b.id).await;

        let msg = message(&conv, &a, "hi");
        assert_eq!(dispatcher.broadcast_new_message(&conv, &msg, &a).await, 1);

        match b_rx.try_recv().unwrap() {
            GatewayEvent::NewMessage(payload) => {
                assert_eq!(payload.message, msg);
                assert_eq!(payload.sender_name, "a");
                assert_eq!(payload.sender_avatar.as_deref(), Some("https://img/a.png"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_connection_of_a_user_receives() {
        let dispatcher = Dispatcher::new();
        let (a, b) = (user("a"), user("b"));
        let conv = conversation(&[&a, &b]);

        let (_, mut phone) = dispatcher.on_connect(b.id).await;
        let (_, mut laptop) = dispatcher.on_connect(b.id).await;
        assert_eq!(dispatcher.connection_count(b.id).await, 2);

        let msg = message(&conv, &a, "hi");
        assert_eq!(dispatcher.broadcast_new_message(&conv, &msg, &a).await, 2);
        assert!(matches!(phone.try_recv(), Ok(GatewayEvent::NewMessage(_))));
        assert!(matches!(laptop.try_recv(), Ok(GatewayEvent::NewMessage(_))));
    }

    #[tokio::test]
    async fn offline_participants_are_dropped() {
        let dispatcher = Dispatcher::new();
        let (a, b, c) = (user("a"), user("b"), user("c"));
        let conv = conversation(&[&a, &b, &c]);

        let (conn_id, _rx) = dispatcher.on_connect(b.id).await;
        dispatcher.on_disconnect(b.id, conn_id).await;
        assert_eq!(dispatcher.connection_count(b.id).await, 0);

        let msg = message(&conv, &a, "anyone?");
        assert_eq!(dispatcher.broadcast_new_message(&conv, &msg, &a).await, 0);
    }

    #[tokio::test]
    async fn disconnect_removes_only_that_connection() {
        let dispatcher = Dispatcher::new();
        let b = user("b");

        let (first, _rx1) = dispatcher.on_connect(b.id).await;
        let (_second, mut rx2) = dispatcher.on_connect(b.id).await;
        dispatcher.on_disconnect(b.id, first).await;

        let delivered = dispatcher
            .send_to_room(b.id, GatewayEvent::UserConnected { user_id: b.id })
            .await;
        assert_eq!(delivered, 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let dispatcher = Dispatcher::new();
        let b = user("b");

        let (_, rx) = dispatcher.on_connect(b.id).await;
        drop(rx);

        let delivered = dispatcher
            .send_to_room(b.id, GatewayEvent::UserConnected { user_id: b.id })
            .await;
        assert_eq!(delivered, 0);
        assert_eq!(dispatcher.connection_count(b.id).await, 0);
    }

    #[tokio::test]
    async fn connect_announces_user() {
        let dispatcher = Dispatcher::new();
        let mut global = dispatcher.subscribe();
        let a = user("a");

        dispatcher.on_connect(a.id).await;

        match global.recv().await.unwrap() {
            GatewayEvent::UserConnected { user_id } => assert_eq!(user_id, a.id),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
