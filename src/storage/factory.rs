//! State store factory

use std::sync::Arc;

use crate::config::StorageSettings;

use super::file::FileStateStore;
use super::memory::MemoryStateStore;
use super::redis_store::RedisStateStore;
use super::StateStore;

/// Create a state store based on configuration.
///
/// Returns the appropriate backend based on the `backend` setting:
/// - `"file"`: one JSON file per key under `directory`
/// - `"redis"`: a shared Redis instance at `redis_url`
/// - `"memory"` (default): process-local, lost on restart
///
/// A backend that cannot be opened falls back to memory with a warning.
pub async fn create_state_store(settings: &StorageSettings) -> Arc<dyn StateStore> {
    match settings.backend.as_str() {
        "file" => match FileStateStore::open(&settings.directory).await {
            Ok(store) => {
                tracing::info!(
                    backend = "file",
                    directory = %settings.directory,
                    "Creating file state store"
                );
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    directory = %settings.directory,
                    "File state store unavailable, falling back to memory"
                );
                Arc::new(MemoryStateStore::new())
            }
        },
        "redis" => {
            let store = match RedisStateStore::new(&settings.redis_url, settings.redis_prefix.clone())
            {
                Ok(store) => store,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid Redis URL for state store, falling back to memory"
                    );
                    return Arc::new(MemoryStateStore::new());
                }
            };

            match store.ping().await {
                Ok(()) => {
                    tracing::info!(
                        backend = "redis",
                        prefix = %settings.redis_prefix,
                        "Creating Redis state store"
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Redis state store unreachable, falling back to memory"
                    );
                    Arc::new(MemoryStateStore::new())
                }
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory state store");
            Arc::new(MemoryStateStore::new())
        }
    }
}
