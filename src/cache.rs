//! Recently-used tracker message cache.
//!
//! Avoids refetching the same tracker message when listing reports with
//! jump links. Not authoritative: entries may be evicted at any time and a
//! miss simply falls through to the platform.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use report_tracker_core::MessageRef;

use crate::chat::{ChatMessage, ChatPlatform};

pub const DEFAULT_CAPACITY: usize = 100;

pub struct MessageCache {
    inner: Mutex<LruCache<u64, ChatMessage>>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, message_id: u64) -> Option<ChatMessage> {
        self.inner.lock().ok()?.get(&message_id).cloned()
    }

    pub fn insert(&self, message: ChatMessage) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(message.reference.message_id, message);
        }
    }

    pub fn invalidate(&self, message_id: u64) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.pop(&message_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached message, or fetch it from the platform and remember it.
    ///
    /// Fetch failures are logged and reported as a miss.
    pub async fn resolve(
        &self,
        chat: &dyn ChatPlatform,
        reference: &MessageRef,
    ) -> Option<ChatMessage> {
        if let Some(hit) = self.get(reference.message_id) {
            return Some(hit);
        }
        match chat.fetch(reference).await {
            Ok(Some(message)) => {
                self.insert(message.clone());
                Some(message)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(message_id = reference.message_id, error = %e, "failed to fetch tracker message");
                None
            }
        }
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64) -> ChatMessage {
        ChatMessage {
            reference: MessageRef {
                channel_id: 1,
                message_id: id,
            },
            guild_id: Some(9),
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = MessageCache::new(2);
        cache.insert(msg(1));
        cache.insert(msg(2));
        assert!(cache.get(1).is_some());
        cache.insert(msg(3));
        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate() {
        let cache = MessageCache::default();
        cache.insert(msg(5));
        cache.invalidate(5);
        assert!(cache.is_empty());
    }
}
