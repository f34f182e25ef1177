//! Inbound messages are never pushed to local clients directly: they are stored,
//! published, and come back through the bus subscription like everyone else's.

use std::{future::Future, sync::Arc};

use tokio::sync::mpsc;

use crate::bus::{AnyFanoutBus, FanoutBus, Subscription};
use crate::message::{ChatMessage, ServerEvent};
use crate::registry::{ConnId, Connection, ConnectionRegistry};
use crate::store::{AnyHistoryStore, HistoryStore};

pub type SharedRelay = Arc<Relay<AnyHistoryStore, AnyFanoutBus>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Active,
    Disconnected,
}

#[derive(Debug)]
pub struct Session {
    pub id: ConnId,
    state: SessionState,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }
}

#[derive(Debug)]
pub struct Relay<S, B> {
    store: S,
    bus: B,
    registry: ConnectionRegistry,
    topic: String,
}

impl<S: HistoryStore, B: FanoutBus> Relay<S, B> {
    pub fn new(store: S, bus: B, topic: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            registry: ConnectionRegistry::default(),
            topic: topic.into(),
        }
    }

    pub fn store(&self) -> &S { &self.store }
    pub fn bus(&self) -> &B { &self.bus }
    pub fn registry(&self) -> &ConnectionRegistry { &self.registry }

    /// Oldest first. A store failure means no backlog.
    pub async fn history(&self) -> Vec<ChatMessage> {
        match self.store.replay().await {
            Ok(mut newest_first) => {
                newest_first.reverse();
                newest_first
            }
            Err(error) => {
                tracing::warn!(%error, "history replay failed, sending empty backlog");
                Vec::new()
            }
        }
    }

    /// Registered (held) before the store is read, so a message published
    /// mid-join lands in the backlog, the held queue, or both.
    pub async fn join(&self) -> (Session, mpsc::Receiver<ServerEvent>) {
        let (conn, rx) = Connection::new();
        let mut session = Session { id: conn.id, state: SessionState::Connected };
        self.registry.register_pending(conn).await;

        let backlog = self.history().await;
        let n = backlog.len();
        if self.registry.activate(session.id, backlog).await.is_err() {
            tracing::debug!(conn_id = %session.id, "client gone before backlog was sent");
        }
        session.state = SessionState::Active;

        tracing::info!(conn_id = %session.id, backlog = n, "client joined");
        (session, rx)
    }

    pub async fn handle_inbound(&self, from: ConnId, message: ChatMessage) {
        if let Err(error) = self.store.append(&message).await {
            tracing::warn!(conn_id = %from, %error, "history append failed");
        }
        if let Err(error) = self.bus.publish(&self.topic, &message).await {
            tracing::warn!(conn_id = %from, %error, topic = %self.topic, "publish failed");
        }
    }

    pub async fn deliver(&self, message: &ChatMessage) -> usize {
        self.registry.broadcast_local(message).await
    }

    pub async fn leave(&self, session: &mut Session) {
        if session.state == SessionState::Disconnected {
            return;
        }
        self.registry.unregister(session.id).await;
        session.state = SessionState::Disconnected;
        tracing::info!(conn_id = %session.id, "client left");
    }

    pub async fn subscribe(&self) -> Result<Subscription, crate::bus::BusError> {
        self.bus.subscribe(&self.topic).await
    }

    pub async fn run_fanout<F>(&self, mut sub: Subscription, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                next = sub.recv() => match next {
                    Some(msg) => {
                        let n = self.deliver(&msg).await;
                        tracing::trace!(receivers = n, "delivered");
                    }
                    None => {
                        tracing::error!(topic = %sub.topic(), "bus subscription ended");
                        break;
                    }
                },
            }
        }
        sub.close().await;
    }

    pub async fn close_connections(&self) {
        let n = self.registry.close_all().await;
        tracing::info!(connections = n, "closed all connections");
    }
}
