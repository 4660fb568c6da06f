use super::{Backend, KeyValueBackend, SecretHasher, StoreError};
use crate::config::StoreConfig;
use chrono::Utc;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Logical tables, mapped to configured names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    OAuthRequests,
    LaunchContext,
    Clients,
    StaticTokens,
}

/// A record persisted in the document store.
///
/// Each document lives under its primary key. Every `(index, value)` pair
/// returned by [`Document::index_values`] is also written as a pointer key
/// so the document can be found by that attribute.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: Table;

    fn primary_key(&self) -> &str;

    fn index_values(&self) -> Vec<(&'static str, &str)> {
        Vec::new()
    }

    /// Unix timestamp after which the document reads as absent
    fn expires_on(&self) -> Option<i64> {
        None
    }
}

#[derive(Debug, Clone)]
struct TableNames {
    oauth_requests: String,
    launch_context: String,
    clients: String,
    static_tokens: String,
}

/// Typed document layer over a key-value backend
#[derive(Clone)]
pub struct DocumentStore {
    backend: Backend,
    hasher: SecretHasher,
    tables: Arc<TableNames>,
    legacy_lookups: Arc<AtomicU64>,
}

impl DocumentStore {
    pub fn new(backend: Backend, hasher: SecretHasher, config: &StoreConfig) -> Self {
        Self {
            backend,
            hasher,
            tables: Arc::new(TableNames {
                oauth_requests: config.oauth_requests_table.clone(),
                launch_context: config.launch_context_table.clone(),
                clients: config.clients_table.clone(),
                static_tokens: config.static_tokens_table.clone(),
            }),
            legacy_lookups: Arc::new(AtomicU64::new(0)),
        }
    }

    /// HMAC of a secret-bearing value, as stored
    pub fn hash(&self, value: &str) -> String {
        self.hasher.hash(value)
    }

    /// Number of documents found only through the legacy unhashed lookup
    pub fn legacy_lookups(&self) -> u64 {
        self.legacy_lookups.load(Ordering::Relaxed)
    }

    pub async fn health_check(&self) -> Result<(), String> {
        self.backend.health_check().await
    }

    fn table_name(&self, table: Table) -> &str {
        match table {
            Table::OAuthRequests => &self.tables.oauth_requests,
            Table::LaunchContext => &self.tables.launch_context,
            Table::Clients => &self.tables.clients,
            Table::StaticTokens => &self.tables.static_tokens,
        }
    }

    fn record_key<D: Document>(&self, primary_key: &str) -> String {
        format!("{}:{}", self.table_name(D::TABLE), primary_key)
    }

    fn index_key<D: Document>(&self, index: &str, value: &str) -> String {
        format!("{}:{}:{}", self.table_name(D::TABLE), index, value)
    }

    /// Primary-key read. Expired documents read as `None`.
    pub async fn get<D: Document>(&self, primary_key: &str) -> Result<Option<D>, StoreError> {
        let document: Option<D> = self.backend.get(&self.record_key::<D>(primary_key)).await?;
        Ok(document.filter(|document| !is_expired(document)))
    }

    /// Full insert, replacing any document with the same primary key
    pub async fn put<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let ttl = time_to_live(document);
        let primary_key = document.primary_key().to_string();
        debug!(
            "Writing {} document {}",
            self.table_name(D::TABLE),
            primary_key
        );

        self.backend
            .set(&self.record_key::<D>(&primary_key), document, ttl)
            .await?;
        for (index, value) in document.index_values() {
            self.backend
                .set(&self.index_key::<D>(index, value), &primary_key, ttl)
                .await?;
        }
        Ok(())
    }

    /// Partial update against the current primary key.
    ///
    /// Returns `None` without writing when no live document exists.
    pub async fn update<D, F>(&self, primary_key: &str, apply: F) -> Result<Option<D>, StoreError>
    where
        D: Document,
        F: FnOnce(&mut D) + Send,
    {
        let Some(mut document) = self.get::<D>(primary_key).await? else {
            return Ok(None);
        };
        apply(&mut document);
        self.put(&document).await?;
        Ok(Some(document))
    }

    /// Secondary-index read returning the first live match.
    ///
    /// The pointer is re-checked against the fetched document, so a pointer
    /// left behind by an update or a rotation reads as `None`.
    pub async fn query<D: Document>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Option<D>, StoreError> {
        let pointer: Option<String> = self.backend.get(&self.index_key::<D>(index, value)).await?;
        let Some(primary_key) = pointer else {
            return Ok(None);
        };

        let document = self.get::<D>(&primary_key).await?;
        Ok(document.filter(|document| {
            document
                .index_values()
                .iter()
                .any(|(name, current)| *name == index && *current == value)
        }))
    }

    /// Index read for a secret-bearing attribute.
    ///
    /// Looks up the hashed value first and falls back once to the raw value
    /// for documents written before hashing. Every fallback hit is counted.
    pub async fn query_secret<D: Document>(
        &self,
        index: &str,
        secret: &str,
    ) -> Result<Option<D>, StoreError> {
        if let Some(document) = self.query(index, &self.hash(secret)).await? {
            return Ok(Some(document));
        }

        let document = self.query::<D>(index, secret).await?;
        if document.is_some() {
            let count = self.legacy_lookups.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Found {} document by unhashed {} (legacy lookups so far: {})",
                self.table_name(D::TABLE),
                index,
                count
            );
        }
        Ok(document)
    }

    /// Removes a document and the index pointers that still point at it
    pub async fn delete<D: Document>(&self, primary_key: &str) -> Result<(), StoreError> {
        let record_key = self.record_key::<D>(primary_key);
        if let Some(document) = self.backend.get::<D>(&record_key).await? {
            for (index, value) in document.index_values() {
                let pointer_key = self.index_key::<D>(index, value);
                let pointer: Option<String> = self.backend.get(&pointer_key).await?;
                if pointer.as_deref() == Some(primary_key) {
                    self.backend.delete(&pointer_key).await?;
                }
            }
        }
        self.backend.delete(&record_key).await
    }
}

fn is_expired<D: Document>(document: &D) -> bool {
    document
        .expires_on()
        .is_some_and(|expires_on| expires_on <= Utc::now().timestamp())
}

fn time_to_live<D: Document>(document: &D) -> Option<Duration> {
    document.expires_on().map(|expires_on| {
        let remaining = expires_on - Utc::now().timestamp();
        Duration::from_secs(u64::try_from(remaining).unwrap_or(0).max(1))
    })
}
