use confique::Config;

/// Configuration for the patient validation endpoint
#[derive(Debug, Config, Clone)]
pub struct ValidationConfig {
    /// GET validation endpoint
    #[config(env = "OAUTH_PROXY_VALIDATION_ENDPOINT")]
    pub endpoint: String,

    /// POST validation endpoint, preferred over `endpoint` when set
    #[config(env = "OAUTH_PROXY_VALIDATION_POST_ENDPOINT")]
    pub post_endpoint: Option<String>,

    /// Key sent in the `apiKey` header
    #[config(env = "OAUTH_PROXY_VALIDATION_API_KEY")]
    pub api_key: String,
}
