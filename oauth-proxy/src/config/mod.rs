pub(crate) use crate::config::routes::{ClientStore, IdpSlug, RouteCategory};
pub(crate) use crate::config::store::{StoreBackend, StoreConfig};
pub(crate) use crate::config::upstream::UpstreamConfig;
pub(crate) use crate::config::validation::ValidationConfig;
use confique::Config;

pub mod routes;
pub mod store;
pub mod upstream;
pub mod validation;

/// Environment variable pointing at an optional TOML configuration file
pub const CONFIG_FILE_ENV: &str = "OAUTH_PROXY_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "oauth-proxy.toml";

/// Main configuration structure for the OAuth proxy
#[derive(Debug, Config, Clone)]
pub struct ProxyConfig {
    /// The port the proxy listens on (default: 7100)
    #[config(env = "OAUTH_PROXY_PORT", default = 7100)]
    pub port: u16,

    /// Public origin of the proxy, used to build the upstream callback URL
    #[config(env = "OAUTH_PROXY_HOST", default = "http://localhost:7100")]
    pub host: String,

    /// Base path every OAuth route is mounted under (default: /oauth2)
    #[config(env = "OAUTH_PROXY_WELL_KNOWN_BASE_PATH", default = "/oauth2")]
    pub well_known_base_path: String,

    /// Secret keying the HMAC applied to codes and tokens before storage
    #[config(env = "OAUTH_PROXY_HMAC_SECRET")]
    pub hmac_secret: String,

    /// Accept public clients that authenticate with `client_id` only
    #[config(env = "OAUTH_PROXY_ENABLE_PKCE_AUTHORIZATION_FLOW", default = false)]
    pub enable_pkce_authorization_flow: bool,

    /// Serve operator-provisioned static tokens on refresh
    #[config(env = "OAUTH_PROXY_ENABLE_STATIC_TOKEN_SERVICE", default = false)]
    pub enable_static_token_service: bool,

    /// Identity provider slug used when neither the request nor the route picks one
    #[config(env = "OAUTH_PROXY_IDP")]
    pub idp: Option<String>,

    /// Slug to identity provider id rewrites
    #[config(default = [])]
    pub idps: Vec<IdpSlug>,

    /// Where `/manage` sends the browser
    #[config(env = "OAUTH_PROXY_MANAGE_ENDPOINT")]
    pub manage_endpoint: Option<String>,

    /// Isolated API categories, each with its own upstream issuer
    #[config(default = [])]
    pub categories: Vec<RouteCategory>,

    /// Upstream identity provider configuration
    #[config(nested)]
    pub upstream: UpstreamConfig,

    /// Patient validation endpoint configuration
    #[config(nested)]
    pub validation: ValidationConfig,

    /// Document store configuration
    #[config(nested)]
    pub store: StoreConfig,
}

impl ProxyConfig {
    /// Loads the configuration from environment variables and the optional config file
    pub fn new() -> Result<Self, String> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::builder()
            .env()
            .file(path)
            .load()
            .map_err(|e| e.to_string())
    }

    /// The proxy's own callback handed to the upstream authorize endpoint
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}/redirect",
            self.host.trim_end_matches('/'),
            self.well_known_base_path
        )
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(
        upstream_mock: &wiremock::MockServer,
        validation_mock: &wiremock::MockServer,
    ) -> Self {
        Self {
            port: 0,
            host: "http://proxy.test".to_string(),
            well_known_base_path: "/oauth2".to_string(),
            hmac_secret: "test-hmac-secret".to_string(),
            enable_pkce_authorization_flow: true,
            enable_static_token_service: true,
            idp: Some("default-idp".to_string()),
            idps: vec![IdpSlug {
                slug: "id_me".to_string(),
                id: "0oa_idme".to_string(),
            }],
            manage_endpoint: Some("https://manage.test/account".to_string()),
            categories: vec![],
            upstream: UpstreamConfig {
                issuer: format!("{}/oauth2/default", upstream_mock.uri()),
                timeout_ms: Some(2000),
                api_url: upstream_mock.uri(),
                api_token: "test-ssws-token".to_string(),
                custom_metadata: None,
            },
            validation: ValidationConfig {
                endpoint: format!("{}/internal/auth/v0/validation", validation_mock.uri()),
                post_endpoint: Some(format!(
                    "{}/internal/auth/v1/validation",
                    validation_mock.uri()
                )),
                api_key: "test-validation-key".to_string(),
            },
            store: StoreConfig::for_test(),
        }
    }
}
