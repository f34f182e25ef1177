//! Fan-out bus: cross-instance publish/subscribe on a single chat topic.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{Backend, Config};
use crate::message::ChatMessage;

pub mod memory;
pub mod redis;

use self::memory::MemoryFanoutBus;
use self::redis::RedisFanoutBus;

const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

impl From<fred::error::RedisError> for BusError {
    fn from(e: fred::error::RedisError) -> Self {
        BusError::Unavailable(e.to_string())
    }
}

pub trait FanoutBus: Send + Sync {
    /// No subscribers is not an error.
    fn publish(
        &self,
        topic: &str,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Subscription, BusError>> + Send;

    fn healthy(&self) -> impl Future<Output = bool> + Send;
}

#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<ChatMessage>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `forward` must return once the stop signal fires.
    pub(crate) fn spawn<F, Fut>(topic: &str, forward: F) -> Self
    where
        F: FnOnce(mpsc::Sender<ChatMessage>, oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(forward(tx, stop_rx));
        Self {
            topic: topic.to_owned(),
            rx,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.rx.recv().await
    }

    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(%error, topic = %self.topic, "subscription task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[derive(Debug)]
pub enum AnyFanoutBus {
    Redis(RedisFanoutBus),
    Memory(MemoryFanoutBus),
}

impl FanoutBus for AnyFanoutBus {
    async fn publish(&self, topic: &str, message: &ChatMessage) -> Result<(), BusError> {
        match self {
            AnyFanoutBus::Redis(bus) => bus.publish(topic, message).await,
            AnyFanoutBus::Memory(bus) => bus.publish(topic, message).await,
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        match self {
            AnyFanoutBus::Redis(bus) => bus.subscribe(topic).await,
            AnyFanoutBus::Memory(bus) => bus.subscribe(topic).await,
        }
    }

    async fn healthy(&self) -> bool {
        match self {
            AnyFanoutBus::Redis(bus) => bus.healthy().await,
            AnyFanoutBus::Memory(bus) => bus.healthy().await,
        }
    }
}

impl AnyFanoutBus {
    pub async fn close(&self) {
        if let AnyFanoutBus::Redis(bus) = self {
            bus.quit().await;
        }
    }
}

pub async fn build_fanout_bus(config: &Config) -> Result<AnyFanoutBus, BusError> {
    match config.backend {
        Backend::Redis => Ok(AnyFanoutBus::Redis(RedisFanoutBus::connect(&config.redis_url).await?)),
        Backend::Memory => Ok(AnyFanoutBus::Memory(MemoryFanoutBus::default())),
    }
}

pub(crate) fn decode_delivery(topic: &str, payload: &str) -> Option<ChatMessage> {
    match ChatMessage::decode(payload) {
        Ok(msg) => Some(msg),
        Err(error) => {
            tracing::warn!(%error, %topic, "dropping undecodable bus payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn close_stops_the_forwarding_task() {
        let sub = Subscription::spawn("t", |_tx, stop| async move {
            let _ = stop.await;
        });
        assert_eq!(sub.topic(), "t");
        tokio::time::timeout(std::time::Duration::from_secs(1), sub.close())
            .await
            .expect("close should not hang");
    }

    #[tokio::test]
    async fn recv_yields_forwarded_messages_then_none() {
        let mut sub = Subscription::spawn("t", |tx, _stop| async move {
            let _ = tx.send(ChatMessage(json!(1))).await;
            let _ = tx.send(ChatMessage(json!(2))).await;
        });
        assert_eq!(sub.recv().await, Some(ChatMessage(json!(1))));
        assert_eq!(sub.recv().await, Some(ChatMessage(json!(2))));
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn bad_payloads_are_dropped() {
        assert!(decode_delivery("t", "{oops").is_none());
        assert_eq!(decode_delivery("t", "\"hi\""), Some(ChatMessage(json!("hi"))));
    }
}
