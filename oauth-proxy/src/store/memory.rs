use super::{KeyValueBackend, StoreError};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    payload: String,
    ttl: Option<Duration>,
}

/// Expires every entry after its own ttl, restarting the clock on overwrite
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

#[derive(Clone)]
pub struct InMemoryBackend {
    cache: MokaCache<String, Entry>,
}

impl InMemoryBackend {
    /// Initialize a new in-memory backend bounded to `capacity_mib` MiB of payload
    pub fn new(capacity_mib: usize) -> Result<Self, String> {
        let max_capacity_bytes = u64::try_from(capacity_mib)
            .ok()
            .and_then(|mib| mib.checked_mul(1024 * 1024))
            .ok_or_else(|| format!("Store capacity of {capacity_mib} MiB overflows"))?;

        let cache = MokaCache::builder()
            .expire_after(EntryExpiry)
            .weigher(|key: &String, value: &Entry| -> u32 {
                (key.len() + value.payload.len())
                    .try_into()
                    .unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity_bytes)
            .build();

        Ok(Self { cache })
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        self.cache
            .insert(key.to_string(), Entry { payload, ttl })
            .await;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.cache.get(key).await {
            Some(entry) => serde_json::from_str(&entry.payload)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.remove(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        field: String,
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let backend = InMemoryBackend::new(1).unwrap();
        let data = TestData {
            field: "test".to_string(),
        };

        backend.set("test_key", &data, None).await.unwrap();
        let retrieved: Option<TestData> = backend.get("test_key").await.unwrap();
        assert_eq!(retrieved, Some(data));

        backend.delete("test_key").await.unwrap();
        let retrieved: Option<TestData> = backend.get("test_key").await.unwrap();
        assert!(retrieved.is_none());
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let backend = InMemoryBackend::new(1).unwrap();

        backend
            .set("short", &"gone soon", Some(Duration::from_millis(500)))
            .await
            .unwrap();
        backend.set("forever", &"still here", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(backend.get::<String>("short").await.unwrap().is_none());
        assert_eq!(
            backend.get::<String>("forever").await.unwrap().as_deref(),
            Some("still here")
        );
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let backend = InMemoryBackend::new(1).unwrap();

        backend
            .set("key", &1, Some(Duration::from_millis(500)))
            .await
            .unwrap();
        backend.set("key", &2, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(backend.get::<i32>("key").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let backend = InMemoryBackend::new(1).unwrap();
        backend.set("key", &"not a number", None).await.unwrap();

        let result = backend.get::<u64>("key").await;
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }
}
