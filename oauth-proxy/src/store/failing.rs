use super::memory::InMemoryBackend;
use super::{KeyValueBackend, StoreError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory backend whose writes fail for chosen key prefixes.
///
/// Reads and deletes always reach the inner backend, so documents seeded
/// before a failure is armed stay readable.
#[derive(Clone)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    failing_prefixes: Arc<Mutex<Vec<String>>>,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(1).unwrap(),
            failing_prefixes: Arc::default(),
        }
    }

    /// Fails every later write to a key starting with `prefix`
    pub fn fail_writes_to(&self, prefix: &str) {
        self.failing_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    fn rejects(&self, key: &str) -> bool {
        self.failing_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl KeyValueBackend for FailingBackend {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        if self.rejects(key) {
            return Err(StoreError::Redis(format!("write to {key} refused")));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.inner.get(key).await
    }

    async fn health_check(&self) -> Result<(), String> {
        self.inner.health_check().await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
