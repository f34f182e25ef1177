use std::collections::VecDeque;

use tokio::sync::Mutex;

use super::{HistoryStore, StoreError};
use crate::message::ChatMessage;

/// Process-local history, same semantics as the redis list.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    cap: usize,
    log: Mutex<VecDeque<String>>, // head = newest
}

impl MemoryHistoryStore {
    pub fn new(cap: usize) -> Self {
        Self { cap, log: Mutex::new(VecDeque::with_capacity(cap)) }
    }
}

impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut log = self.log.lock().await;
        log.push_front(message.encode());
        log.truncate(self.cap);
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let records: Vec<String> = self.log.lock().await.iter().cloned().collect();
        Ok(super::decode_records(records))
    }

    async fn healthy(&self) -> bool {
        true
    }
}
