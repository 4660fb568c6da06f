use crate::config::{ClientStore, ProxyConfig, RouteCategory};
use crate::store::{self, DocumentStore, SecretHasher, StoreError};
use crate::upstream::{AdminClient, IssuerMetadata, PatientValidator, UpstreamError};
use log::{error, info};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that prevent the application state from being built
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to create store: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to discover upstream issuer {issuer}: {source}")]
    Discovery {
        issuer: String,
        #[source]
        source: UpstreamError,
    },
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Everything a mounted route category needs to serve requests
#[derive(Debug, Clone)]
pub struct RouteContext {
    /// Path suffix under the base path, empty for the default routes
    pub api_category: String,
    pub issuer: Arc<IssuerMetadata>,
    /// Route-level default idp slug
    pub idp: Option<String>,
    pub client_store: ClientStore,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub store: DocumentStore,
    pub http: Client,
    pub admin: AdminClient,
    pub validator: PatientValidator,
    pub routes: Arc<Vec<RouteContext>>,
}

impl AppState {
    fn create_http_client(timeout_ms: Option<u64>) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)));
        if let Some(timeout_ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        builder.build()
    }

    pub async fn new(config: ProxyConfig) -> Result<Self, StateError> {
        let backend = store::create_backend(&config.store).await?;
        let hasher = SecretHasher::new(&config.hmac_secret)?;
        let store = DocumentStore::new(backend, hasher, &config.store);
        Self::with_store(config, store).await
    }

    /// Builds the state around an existing store, discovering every issuer
    pub async fn with_store(config: ProxyConfig, store: DocumentStore) -> Result<Self, StateError> {
        let http = Self::create_http_client(config.upstream.timeout_ms)?;
        let routes = Self::discover_routes(&http, &config).await?;

        Ok(Self {
            admin: AdminClient::new(
                http.clone(),
                &config.upstream.api_url,
                &config.upstream.api_token,
            ),
            validator: PatientValidator::new(http.clone(), &config.validation),
            config: Arc::new(config),
            store,
            http,
            routes: Arc::new(routes),
        })
    }

    async fn discover_routes(
        http: &Client,
        config: &ProxyConfig,
    ) -> Result<Vec<RouteContext>, StateError> {
        let overrides = config.upstream.custom_metadata.as_ref();
        let discover = |issuer: String| async move {
            IssuerMetadata::discover(http, &issuer, overrides)
                .await
                .map(Arc::new)
                .map_err(|source| {
                    error!("Issuer discovery failed for {}: {}", issuer, source);
                    StateError::Discovery { issuer, source }
                })
        };

        let mut routes = vec![RouteContext {
            api_category: String::new(),
            issuer: discover(config.upstream.issuer.clone()).await?,
            idp: None,
            client_store: ClientStore::Upstream,
        }];

        for RouteCategory {
            api_category,
            upstream_issuer,
            idp,
            client_store,
        } in &config.categories
        {
            info!("Mounting API category {}", api_category);
            routes.push(RouteContext {
                api_category: api_category.clone(),
                issuer: discover(upstream_issuer.clone()).await?,
                idp: idp.clone(),
                client_store: *client_store,
            });
        }
        Ok(routes)
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mount_discovery;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_state_discovers_every_category() {
        let upstream = MockServer::start().await;
        let validation = MockServer::start().await;
        mount_discovery(&upstream, "default").await;
        mount_discovery(&upstream, "health").await;

        let mut config = ProxyConfig::for_test_with_mocks(&upstream, &validation);
        config.categories = vec![RouteCategory {
            api_category: "/health/v1".to_string(),
            upstream_issuer: format!("{}/oauth2/health", upstream.uri()),
            idp: Some("id_me".to_string()),
            client_store: ClientStore::Local,
        }];

        let state = AppState::new(config).await.unwrap();
        assert_eq!(state.routes.len(), 2);
        assert_eq!(state.routes[0].api_category, "");
        assert_eq!(state.routes[1].api_category, "/health/v1");
        assert_eq!(
            state.routes[1].issuer.issuer,
            format!("{}/oauth2/health", upstream.uri())
        );
        assert_eq!(state.routes[1].client_store, ClientStore::Local);
        assert!(state.health_check().await);
    }

    #[tokio::test]
    async fn test_state_fails_when_discovery_fails() {
        let upstream = MockServer::start().await;
        let validation = MockServer::start().await;

        let config = ProxyConfig::for_test_with_mocks(&upstream, &validation);
        let result = AppState::new(config).await;
        assert!(matches!(result, Err(StateError::Discovery { .. })));
    }

    #[tokio::test]
    async fn test_state_clone_shares_data() {
        let upstream = MockServer::start().await;
        let validation = MockServer::start().await;
        mount_discovery(&upstream, "default").await;

        let state = AppState::new(ProxyConfig::for_test_with_mocks(&upstream, &validation))
            .await
            .unwrap();
        let state2 = state.clone();

        assert_eq!(Arc::as_ptr(&state.config), Arc::as_ptr(&state2.config));
        assert_eq!(Arc::as_ptr(&state.routes), Arc::as_ptr(&state2.routes));
    }
}
