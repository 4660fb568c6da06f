use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod documents;
#[cfg(test)]
pub mod failing;
pub mod hashing;
pub mod memory;
pub mod records;
pub mod redis;

pub(crate) use documents::{Document, DocumentStore, Table};
pub(crate) use hashing::SecretHasher;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Key-value contract every document store backend fulfills.
///
/// Values are JSON encoded. A `ttl` of `None` keeps the entry until it is
/// deleted or evicted.
#[async_trait::async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Store a value under `key`
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Retrieve the value stored under `key`
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Returns Ok(()) if the backend is reachable
    async fn health_check(&self) -> Result<(), String>;

    /// Delete the value stored under `key`
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Backend selected at startup from configuration
#[derive(Clone)]
pub enum Backend {
    /// In-memory backend using Moka
    InMemory(memory::InMemoryBackend),
    /// Redis-based backend
    Redis(redis::RedisBackend),
    /// In-memory backend with injectable write failures
    #[cfg(test)]
    Failing(failing::FailingBackend),
}

#[async_trait::async_trait]
impl KeyValueBackend for Backend {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(backend) => backend.set(key, value, ttl).await,
            Self::Redis(backend) => backend.set(key, value, ttl).await,
            #[cfg(test)]
            Self::Failing(backend) => backend.set(key, value, ttl).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self {
            Self::InMemory(backend) => backend.get(key).await,
            Self::Redis(backend) => backend.get(key).await,
            #[cfg(test)]
            Self::Failing(backend) => backend.get(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(backend) => backend.health_check().await,
            Self::Redis(backend) => backend.health_check().await,
            #[cfg(test)]
            Self::Failing(backend) => backend.health_check().await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::InMemory(backend) => backend.delete(key).await,
            Self::Redis(backend) => backend.delete(key).await,
            #[cfg(test)]
            Self::Failing(backend) => backend.delete(key).await,
        }
    }
}

/// Creates the backend named by the store configuration
pub async fn create_backend(config: &crate::config::StoreConfig) -> Result<Backend, StoreError> {
    match config.backend {
        crate::config::StoreBackend::InMemory => {
            let backend =
                memory::InMemoryBackend::new(config.memory.capacity).map_err(StoreError::Config)?;
            Ok(Backend::InMemory(backend))
        }
        crate::config::StoreBackend::Redis => {
            if config.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for the redis store backend".to_string(),
                ));
            }
            let backend = redis::RedisBackend::new(&config.redis.url)
                .await
                .map_err(StoreError::Config)?;
            Ok(Backend::Redis(backend))
        }
    }
}
