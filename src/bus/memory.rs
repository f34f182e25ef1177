use tokio::sync::broadcast;

use super::{decode_delivery, BusError, FanoutBus, Subscription};
use crate::message::ChatMessage;

const CAPACITY: usize = 1024;

/// In-process bus. Clones share one channel, so several relays handed clones
/// of the same bus behave like instances sharing one redis.
#[derive(Debug, Clone)]
pub struct MemoryFanoutBus {
    tx: broadcast::Sender<(String, String)>, // (topic, payload)
}

impl Default for MemoryFanoutBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }
}

impl FanoutBus for MemoryFanoutBus {
    async fn publish(&self, topic: &str, message: &ChatMessage) -> Result<(), BusError> {
        // no receivers is fine, nobody is listening yet
        let _ = self.tx.send((topic.to_owned(), message.encode()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let mut rx = self.tx.subscribe();
        let topic_owned = topic.to_owned();

        Ok(Subscription::spawn(topic, move |tx, mut stop| async move {
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    delivery = rx.recv() => match delivery {
                        Ok((t, payload)) => {
                            if t != topic_owned {
                                continue;
                            }
                            let Some(msg) = decode_delivery(&t, &payload) else { continue };
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(topic = %topic_owned, skipped = n, "memory bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }))
    }

    async fn healthy(&self) -> bool {
        true
    }
}
