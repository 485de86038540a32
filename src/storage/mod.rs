//! Durable key/value storage shared by the queue and the content cache.
//!
//! Every write is a full overwrite of the value under its key. Values are JSON
//! documents; [`load_json`] and [`save_json`] handle encoding.

mod cache;
mod factory;
mod file;
mod memory;
mod redis_store;

pub use cache::{ContentCache, StoredContentCache, MAX_HISTORY_ENTRIES};
pub use factory::create_state_store;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use redis_store::RedisStateStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::metrics::StoreMetrics;

/// Key holding the serialized message queue
pub const QUEUE_KEY: &str = "message_queue";

/// Key holding the last known board snapshot
pub const CURRENT_CONTENT_KEY: &str = "current_content";

/// Key holding the last successful sync time
pub const LAST_SYNC_KEY: &str = "last_sync";

/// Key holding the display history
pub const HISTORY_KEY: &str = "message_history";

/// Errors that can occur in a state store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key cannot be stored by this backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Durable key/value store.
///
/// Implementations must be thread-safe; one store is shared by the queue,
/// the content cache, and the HTTP handlers.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the raw value for `key`.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite the value for `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Backend identifier (memory, file, redis).
    fn backend_name(&self) -> &'static str;
}

/// Read and decode a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let raw = match store.read(key).await {
        Ok(raw) => raw,
        Err(e) => {
            StoreMetrics::error(store.backend_name(), "read");
            return Err(e);
        }
    };

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.write(key, &raw).await.inspect_err(|_| {
        StoreMetrics::error(store.backend_name(), "write");
    })
}
