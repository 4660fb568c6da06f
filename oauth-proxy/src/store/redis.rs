use super::{KeyValueBackend, StoreError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct RedisBackend {
    _client: Client,
    conn_manager: ConnectionManager,
}

impl RedisBackend {
    /// Connect to redis and verify the connection with a PING
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client = Client::open(redis_url)
            .map_err(|err| format!("Failed to connect to Redis: {}", err))?;

        let conn_manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|err| format!("Failed to create Redis connection manager: {}", err))?;

        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            conn_manager,
            _client: client,
        })
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        let result = match ttl {
            // SET EX rejects zero, so anything shorter than a second rounds up
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, serialized, ttl.as_secs().max(1))
                    .await
            }
            None => conn.set::<_, _, ()>(key, serialized).await,
        };

        result.map_err(|err| {
            error!("Redis error while setting key {}: {}", key, err);
            StoreError::Redis(err.to_string())
        })
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => {
                if err.kind() == redis::ErrorKind::TypeError {
                    return Ok(None);
                }
                error!("Redis error while getting key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };

        match result {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(key).await.map_err(|err| {
            error!("Redis error while deleting key {}: {}", key, err);
            StoreError::Redis(err.to_string())
        })
    }
}
