//! History store: the bounded recent-message log shared by every instance.

use crate::config::{Backend, Config};
use crate::message::ChatMessage;

pub mod memory;
pub mod redis;

use self::memory::MemoryHistoryStore;
use self::redis::RedisHistoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<fred::error::RedisError> for StoreError {
    fn from(e: fred::error::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub trait HistoryStore: Send + Sync {
    /// Pushes `message` to the head of the log and trims it back to the cap.
    fn append(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Up to `cap` messages, most recent first. Read only.
    fn replay(&self) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;

    fn healthy(&self) -> impl std::future::Future<Output = bool> + Send;
}

#[derive(Debug)]
pub enum AnyHistoryStore {
    Redis(RedisHistoryStore),
    Memory(MemoryHistoryStore),
}

impl HistoryStore for AnyHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError> {
        match self {
            AnyHistoryStore::Redis(store) => store.append(message).await,
            AnyHistoryStore::Memory(store) => store.append(message).await,
        }
    }

    async fn replay(&self) -> Result<Vec<ChatMessage>, StoreError> {
        match self {
            AnyHistoryStore::Redis(store) => store.replay().await,
            AnyHistoryStore::Memory(store) => store.replay().await,
        }
    }

    async fn healthy(&self) -> bool {
        match self {
            AnyHistoryStore::Redis(store) => store.healthy().await,
            AnyHistoryStore::Memory(store) => store.healthy().await,
        }
    }
}

impl AnyHistoryStore {
    pub async fn close(&self) {
        if let AnyHistoryStore::Redis(store) = self {
            store.quit().await;
        }
    }
}

pub async fn build_history_store(config: &Config) -> Result<AnyHistoryStore, StoreError> {
    match config.backend {
        Backend::Redis => Ok(AnyHistoryStore::Redis(
            RedisHistoryStore::connect(&config.redis_url, &config.history_key, config.history_cap).await?,
        )),
        Backend::Memory => Ok(AnyHistoryStore::Memory(MemoryHistoryStore::new(config.history_cap))),
    }
}

/// Stored records that no longer parse are dropped rather than failing the whole replay.
pub(crate) fn decode_records(records: Vec<String>) -> Vec<ChatMessage> {
    records
        .into_iter()
        .filter_map(|raw| match ChatMessage::decode(&raw) {
            Ok(msg) => Some(msg),
            Err(error) => {
                tracing::warn!(%error, "skipping undecodable history entry");
                None
            }
        })
        .collect()
}
