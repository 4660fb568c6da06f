use confique::Config;
use serde::Deserialize;

/// Specifies which document store backend to use
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    InMemory,
    Redis,
}

/// Configuration for the document store
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Store backend: "in-memory" or "redis" (default: in-memory)
    #[config(env = "OAUTH_PROXY_STORE_BACKEND", default = "in-memory")]
    pub backend: StoreBackend,

    /// Seconds a freshly authorized correlation record lives (default: 10 minutes)
    #[config(env = "OAUTH_PROXY_STORE_AUTHORIZE_TTL", default = 600)]
    pub authorize_ttl: u64,

    /// Seconds a token-bearing record lives (default: 42 days)
    #[config(env = "OAUTH_PROXY_STORE_SESSION_TTL", default = 3628800)]
    pub session_ttl: u64,

    #[config(env = "OAUTH_PROXY_STORE_OAUTH_REQUESTS_TABLE", default = "OAuthRequestsV2")]
    pub oauth_requests_table: String,

    #[config(env = "OAUTH_PROXY_STORE_LAUNCH_CONTEXT_TABLE", default = "LaunchContext")]
    pub launch_context_table: String,

    #[config(env = "OAUTH_PROXY_STORE_CLIENTS_TABLE", default = "Clients")]
    pub clients_table: String,

    #[config(env = "OAUTH_PROXY_STORE_STATIC_TOKENS_TABLE", default = "StaticTokens")]
    pub static_tokens_table: String,

    /// In-memory backend configuration
    #[config(nested)]
    pub memory: InMemoryConfig,

    /// Redis backend configuration
    #[config(nested)]
    pub redis: RedisConfig,
}

/// In-memory store configuration options
#[derive(Debug, Config, Clone)]
pub struct InMemoryConfig {
    /// Maximum capacity in MiB (default: 128 MiB)
    #[config(env = "OAUTH_PROXY_STORE_MEMORY_CAPACITY", default = 128)]
    pub capacity: usize,
}

/// Redis store configuration options
#[derive(Debug, Config, Clone)]
pub struct RedisConfig {
    /// Redis connection string
    #[config(env = "OAUTH_PROXY_STORE_REDIS_URL", default = "")]
    pub url: String,
}

impl StoreConfig {
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            authorize_ttl: 600,
            session_ttl: 3600,
            oauth_requests_table: "OAuthRequestsV2".to_string(),
            launch_context_table: "LaunchContext".to_string(),
            clients_table: "Clients".to_string(),
            static_tokens_table: "StaticTokens".to_string(),
            memory: InMemoryConfig { capacity: 16 },
            redis: RedisConfig { url: String::new() },
        }
    }
}
