//! Redis-backed state store.
//!
//! Values live under `{prefix}:{key}` as plain strings. The multiplexed
//! connection is established lazily and dropped after connection errors so
//! the next call reconnects.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tokio::sync::RwLock;

use super::{StateStore, StorageError};

/// State store on a shared Redis instance.
pub struct RedisStateStore {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    prefix: String,
}

impl RedisStateStore {
    /// Create a store. No connection is made until first use.
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self, StorageError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, StorageError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(ref c) = *guard {
            return Ok(c.clone());
        }

        let conn = self.client.get_multiplexed_tokio_connection().await?;
        *guard = Some(conn.clone());
        tracing::info!(prefix = %self.prefix, "Redis state store connected");
        Ok(conn)
    }

    async fn handle_error(&self, error: redis::RedisError) -> StorageError {
        if error.is_connection_dropped() || error.is_io_error() {
            *self.connection.write().await = None;
        }
        StorageError::Redis(error)
    }

    /// Check connectivity.
    pub async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(self.handle_error(e).await),
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<Option<String>> = conn.get(self.full_key(key)).await;
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.handle_error(e).await),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<()> = conn.set(self.full_key(key), value).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.handle_error(e).await),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<()> = conn.del(self.full_key(key)).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.handle_error(e).await),
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
