use confique::Config;
use std::collections::HashMap;

/// Configuration for the upstream identity provider
#[derive(Debug, Config, Clone)]
pub struct UpstreamConfig {
    /// Issuer URL the OIDC discovery document is fetched from
    #[config(env = "OAUTH_PROXY_UPSTREAM_ISSUER")]
    pub issuer: String,

    /// Timeout in milliseconds applied to every outbound call (default: transport only)
    #[config(env = "OAUTH_PROXY_UPSTREAM_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Base URL of the provider's admin API (applications, authorization servers)
    #[config(env = "OAUTH_PROXY_UPSTREAM_API_URL")]
    pub api_url: String,

    /// SSWS token for the admin API
    #[config(env = "OAUTH_PROXY_UPSTREAM_API_TOKEN")]
    pub api_token: String,

    /// Overrides applied on top of the discovered issuer metadata
    pub custom_metadata: Option<HashMap<String, String>>,
}
