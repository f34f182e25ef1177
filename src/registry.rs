//! Per-instance set of live websocket sessions.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::ConnectionLost;
use crate::message::{ChatMessage, ServerEvent};

pub const PUSH_BUFFER: usize = 100;

pub type ConnId = Uuid;

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnId,
    tx: mpsc::Sender<ServerEvent>,
}

impl Connection {
    pub fn new() -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(PUSH_BUFFER);
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    /// Full queue drops the event, closed queue means the session is gone.
    pub fn push(&self, event: ServerEvent) -> Result<(), ConnectionLost> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "push queue full, dropping event");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ConnectionLost),
        }
    }
}

#[derive(Debug)]
struct Entry {
    conn: Connection,
    held: Option<Vec<ChatMessage>>, // Some = joining, backlog not sent yet
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<ConnId, Entry>>>,
}

impl ConnectionRegistry {
    pub async fn register(&self, conn: Connection) {
        self.inner.lock().await.insert(conn.id, Entry { conn, held: None });
    }

    /// Live messages for `conn` are held back until [`Self::activate`].
    pub async fn register_pending(&self, conn: Connection) {
        self.inner.lock().await.insert(conn.id, Entry { conn, held: Some(Vec::new()) });
    }

    /// Queues the backlog, then whatever arrived meanwhile.
    pub async fn activate(&self, id: ConnId, backlog: Vec<ChatMessage>) -> Result<(), ConnectionLost> {
        let mut conns = self.inner.lock().await;
        let entry = conns.get_mut(&id).ok_or(ConnectionLost)?;
        let held = entry.held.take().unwrap_or_default();

        let mut sent = entry.conn.push(ServerEvent::LoadMessages(backlog));
        for msg in held {
            if sent.is_err() {
                break;
            }
            sent = entry.conn.push(ServerEvent::ChatMessage(msg));
        }
        if sent.is_err() {
            conns.remove(&id);
        }
        sent
    }

    pub async fn unregister(&self, id: ConnId) -> bool {
        self.inner.lock().await.remove(&id).is_some()
    }

    pub async fn broadcast_local(&self, message: &ChatMessage) -> usize {
        let mut conns = self.inner.lock().await;
        let mut lost = Vec::new();
        for (id, entry) in conns.iter_mut() {
            match &mut entry.held {
                Some(held) if held.len() < PUSH_BUFFER => held.push(message.clone()),
                Some(_) => tracing::warn!(conn_id = %id, "join buffer full, dropping event"),
                None => {
                    if entry.conn.push(ServerEvent::ChatMessage(message.clone())).is_err() {
                        lost.push(*id);
                    }
                }
            }
        }
        for id in &lost {
            conns.remove(id);
            tracing::debug!(conn_id = %id, "dropped lost connection");
        }
        conns.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn close_all(&self) -> usize {
        let mut conns = self.inner.lock().await;
        let n = conns.len();
        conns.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_everyone_registered() {
        let reg = ConnectionRegistry::default();
        let (a, mut rx_a) = Connection::new();
        let (b, mut rx_b) = Connection::new();
        reg.register(a).await;
        reg.register(b).await;

        let msg = ChatMessage(json!({"text": "hi"}));
        assert_eq!(reg.broadcast_local(&msg).await, 2);
        assert_eq!(rx_a.recv().await, Some(ServerEvent::ChatMessage(msg.clone())));
        assert_eq!(rx_b.recv().await, Some(ServerEvent::ChatMessage(msg)));
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_stops_pushes() {
        let reg = ConnectionRegistry::default();
        let (a, mut rx_a) = Connection::new();
        let id = a.id;
        reg.register(a).await;

        assert!(reg.unregister(id).await);
        assert!(!reg.unregister(id).await);

        reg.broadcast_local(&ChatMessage(json!("late"))).await;
        assert_eq!(rx_a.recv().await, None);
    }

    #[tokio::test]
    async fn dead_connections_are_pruned() {
        let reg = ConnectionRegistry::default();
        let (a, rx_a) = Connection::new();
        let (b, mut rx_b) = Connection::new();
        reg.register(a).await;
        reg.register(b).await;
        drop(rx_a);

        assert_eq!(reg.broadcast_local(&ChatMessage(json!("x"))).await, 1);
        assert_eq!(reg.len().await, 1);
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn full_queue_drops_but_keeps_connection() {
        let (a, mut rx) = Connection::new();
        for i in 0..PUSH_BUFFER + 5 {
            assert!(a.push(ServerEvent::ChatMessage(ChatMessage(json!(i)))).is_ok());
        }
        let mut got = 0;
        while rx.try_recv().is_ok() {
            got += 1;
        }
        assert_eq!(got, PUSH_BUFFER);
    }

    #[tokio::test]
    async fn joining_connection_gets_backlog_before_held_messages() {
        let reg = ConnectionRegistry::default();
        let (a, mut rx) = Connection::new();
        let id = a.id;
        reg.register_pending(a).await;

        reg.broadcast_local(&ChatMessage(json!("during join"))).await;
        assert!(rx.try_recv().is_err());

        reg.activate(id, vec![ChatMessage(json!("old"))]).await.unwrap();
        assert_eq!(rx.recv().await, Some(ServerEvent::LoadMessages(vec![ChatMessage(json!("old"))])));
        assert_eq!(rx.recv().await, Some(ServerEvent::ChatMessage(ChatMessage(json!("during join")))));

        reg.broadcast_local(&ChatMessage(json!("live"))).await;
        assert_eq!(rx.recv().await, Some(ServerEvent::ChatMessage(ChatMessage(json!("live")))));
    }

    #[tokio::test]
    async fn activate_after_leave_reports_lost() {
        let reg = ConnectionRegistry::default();
        let (a, _rx) = Connection::new();
        let id = a.id;
        reg.register_pending(a).await;
        reg.unregister(id).await;
        assert_eq!(reg.activate(id, Vec::new()).await, Err(ConnectionLost));
    }

    #[tokio::test]
    async fn close_all_hangs_up_writers() {
        let reg = ConnectionRegistry::default();
        let (a, mut rx) = Connection::new();
        reg.register(a).await;
        assert_eq!(reg.close_all().await, 1);
        assert_eq!(rx.recv().await, None);
    }
}
