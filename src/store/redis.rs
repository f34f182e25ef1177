use fred::prelude::*;

use super::{HistoryStore, StoreError};
use crate::message::ChatMessage;

/// History kept in a redis list: `LPUSH` then `LTRIM 0 cap-1`, read back with `LRANGE`.
pub struct RedisHistoryStore {
    client: RedisClient,
    key: String,
    cap: usize,
}

impl std::fmt::Debug for RedisHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisHistoryStore")
            .field("key", &self.key)
            .field("cap", &self.cap)
            .finish()
    }
}

impl RedisHistoryStore {
    #[tracing::instrument(name = "RedisHistoryStore::connect", skip(url), err)]
    pub async fn connect(url: &str, key: &str, cap: usize) -> Result<Self, StoreError> {
        let client = RedisClient::new(
            RedisConfig::from_url(url)?,
            None,
            None,
            Some(ReconnectPolicy::default()),
        );
        client.init().await?;

        Ok(Self { client, key: key.to_owned(), cap })
    }

    pub async fn quit(&self) {
        if let Err(error) = self.client.quit().await {
            tracing::debug!(%error, "history client quit");
        }
    }
}

impl HistoryStore for RedisHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.client
            .lpush::<(), _, _>(self.key.as_str(), message.encode())
            .await?;
        self.client
            .ltrim::<(), _>(self.key.as_str(), 0, self.cap as i64 - 1)
            .await?;
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let records: Vec<String> = self
            .client
            .lrange(self.key.as_str(), 0, self.cap as i64 - 1)
            .await?;
        Ok(super::decode_records(records))
    }

    async fn healthy(&self) -> bool {
        self.client.ping::<()>().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store(cap: usize) -> (RedisHistoryStore, String) {
        dotenvy::dotenv().ok();
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let key = format!("chat_relay_test:{}", uuid::Uuid::new_v4());
        (RedisHistoryStore::connect(&url, &key, cap).await.unwrap(), key)
    }

    #[tokio::test]
    #[ignore = "needs a running redis (REDIS_URL)"]
    async fn list_is_pushed_at_head_and_trimmed() {
        let (store, key) = store(2).await;
        for t in ["A", "B", "C"] {
            store.append(&ChatMessage(json!({ "text": t }))).await.unwrap();
        }

        let raw: Vec<String> = store.client.lrange(key.as_str(), 0, -1).await.unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(ChatMessage::decode(&raw[0]).unwrap().0["text"], "C");

        let replayed = store.replay().await.unwrap();
        assert_eq!(replayed[0].0["text"], "C");
        assert_eq!(replayed[1].0["text"], "B");

        store.client.del::<(), _>(key.as_str()).await.unwrap();
        store.quit().await;
    }

    #[tokio::test]
    #[ignore = "needs a running redis (REDIS_URL)"]
    async fn missing_key_replays_empty() {
        let (store, _key) = store(50).await;
        assert!(store.replay().await.unwrap().is_empty());
        assert!(store.healthy().await);
        store.quit().await;
    }
}
