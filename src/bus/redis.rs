use fred::{clients::SubscriberClient, prelude::*};
use tokio::sync::broadcast;

use super::{decode_delivery, BusError, FanoutBus, Subscription};
use crate::message::ChatMessage;

/// Publishing goes through a shared client; every subscription gets its own
/// `SubscriberClient`, which re-subscribes after a reconnect.
pub struct RedisFanoutBus {
    config: RedisConfig,
    publisher: RedisClient,
}

impl std::fmt::Debug for RedisFanoutBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFanoutBus").finish_non_exhaustive()
    }
}

impl RedisFanoutBus {
    #[tracing::instrument(name = "RedisFanoutBus::connect", skip(url), err)]
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let config = RedisConfig::from_url(url)?;
        let publisher = RedisClient::new(config.clone(), None, None, Some(ReconnectPolicy::default()));
        publisher.init().await?;

        Ok(Self { config, publisher })
    }

    pub async fn quit(&self) {
        if let Err(error) = self.publisher.quit().await {
            tracing::debug!(%error, "publisher quit");
        }
    }
}

impl FanoutBus for RedisFanoutBus {
    async fn publish(&self, topic: &str, message: &ChatMessage) -> Result<(), BusError> {
        self.publisher
            .publish::<(), _, _>(topic, message.encode())
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "RedisFanoutBus::subscribe", skip(self), err)]
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let subscriber = SubscriberClient::new(self.config.clone(), None, None, Some(ReconnectPolicy::default()));
        subscriber.init().await?;

        let mut manager = subscriber.manage_subscriptions();
        let mut messages = subscriber.message_rx();
        let mut reconnects = subscriber.reconnect_rx();
        if let Err(error) = subscriber.subscribe(topic).await {
            manager.abort();
            let _ = subscriber.quit().await;
            return Err(error.into());
        }
        let topic_owned = topic.to_owned();

        Ok(Subscription::spawn(topic, move |tx, mut stop| async move {
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = &mut manager => {
                        tracing::error!(topic = %topic_owned, "redis subscription manager stopped");
                        break;
                    }
                    Ok(server) = reconnects.recv() => {
                        tracing::warn!(server = ?server, topic = %topic_owned, "redis subscriber reconnected, resubscribing");
                    }
                    delivery = messages.recv() => match delivery {
                        Ok(message) => {
                            if &*message.channel != topic_owned.as_str() {
                                continue;
                            }
                            let payload: String = match message.value.convert() {
                                Ok(p) => p,
                                Err(error) => {
                                    tracing::warn!(%error, topic = %topic_owned, "non-text bus payload");
                                    continue;
                                }
                            };
                            let Some(msg) = decode_delivery(&topic_owned, &payload) else { continue };
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(topic = %topic_owned, skipped = n, "redis subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            manager.abort();
            if let Err(error) = subscriber.unsubscribe(topic_owned.as_str()).await {
                tracing::debug!(%error, "unsubscribe");
            }
            if let Err(error) = subscriber.quit().await {
                tracing::debug!(%error, "subscriber quit");
            }
        }))
    }

    async fn healthy(&self) -> bool {
        self.publisher.ping::<()>().await.is_ok()
    }
}
