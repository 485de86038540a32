//! Shared content cache: last known board, sync time and display history.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{load_json, save_json, StateStore, StorageError};
use super::{CURRENT_CONTENT_KEY, HISTORY_KEY, LAST_SYNC_KEY};
use crate::board::{BoardSnapshot, HistoryEntry};

/// Maximum entries kept in the display history
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Cache of what the board last showed, shared between writers.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Last snapshot observed on the board.
    async fn last_known_board(&self) -> Result<Option<BoardSnapshot>, StorageError>;

    /// Replace the cached snapshot.
    async fn save_board(&self, snapshot: &BoardSnapshot) -> Result<(), StorageError>;

    /// Record when the board was last synced.
    async fn save_last_sync_time(&self, at: DateTime<Utc>) -> Result<(), StorageError>;

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Display history, most recent first.
    async fn history(&self) -> Result<Vec<HistoryEntry>, StorageError>;

    /// Prepend an entry, dropping the oldest beyond the cap.
    async fn add_to_history(&self, entry: HistoryEntry) -> Result<(), StorageError>;
}

/// [`ContentCache`] persisted in a [`StateStore`].
pub struct StoredContentCache {
    store: Arc<dyn StateStore>,
    /// Serializes history read-modify-write
    history_lock: tokio::sync::Mutex<()>,
}

impl StoredContentCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            history_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl ContentCache for StoredContentCache {
    async fn last_known_board(&self) -> Result<Option<BoardSnapshot>, StorageError> {
        load_json(self.store.as_ref(), CURRENT_CONTENT_KEY).await
    }

    async fn save_board(&self, snapshot: &BoardSnapshot) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), CURRENT_CONTENT_KEY, snapshot).await
    }

    async fn save_last_sync_time(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), LAST_SYNC_KEY, &at).await
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        load_json(self.store.as_ref(), LAST_SYNC_KEY).await
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        Ok(load_json(self.store.as_ref(), HISTORY_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn add_to_history(&self, entry: HistoryEntry) -> Result<(), StorageError> {
        let _guard = self.history_lock.lock().await;

        let mut history = self.history().await?;
        history.insert(0, entry);
        history.truncate(MAX_HISTORY_ENTRIES);

        save_json(self.store.as_ref(), HISTORY_KEY, &history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{charset, HistoryStatus};
    use crate::storage::MemoryStateStore;

    fn cache() -> StoredContentCache {
        StoredContentCache::new(Arc::new(MemoryStateStore::new()))
    }

    fn entry(text: &str) -> HistoryEntry {
        HistoryEntry {
            id: uuid::Uuid::new_v4(),
            text: text.to_string(),
            status: HistoryStatus::Sent,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_board_roundtrip() {
        let cache = cache();
        assert!(cache.last_known_board().await.unwrap().is_none());

        let snapshot = BoardSnapshot::new(charset::board_layout("HI"));
        cache.save_board(&snapshot).await.unwrap();
        let loaded = cache.last_known_board().await.unwrap().unwrap();
        assert!(loaded.same_content(&snapshot));

        let now = Utc::now();
        cache.save_last_sync_time(now).await.unwrap();
        assert_eq!(cache.last_sync_time().await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn test_history_most_recent_first_and_capped() {
        let cache = cache();
        for i in 0..(MAX_HISTORY_ENTRIES + 5) {
            cache.add_to_history(entry(&format!("MSG {}", i))).await.unwrap();
        }

        let history = cache.history().await.unwrap();
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history[0].text, format!("MSG {}", MAX_HISTORY_ENTRIES + 4));
    }
}
