use crate::config::{ClientStore, ProxyConfig, RouteCategory};
use crate::create_app;
use crate::state::AppState;
use crate::store::failing::FailingBackend;
use crate::store::{Backend, DocumentStore, SecretHasher};
use axum::body::Body;
use axum::Router;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

/// Test fixture for driving the full router against mocked upstream services.
///
/// `upstream_mock` stands in for the identity provider (discovery, token,
/// admin API and the pass-through endpoints) and `validation_mock` for the
/// patient validation service. The store is in-memory.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     fixture.mount_application("clientA", &["https://app.test/cb"]).await;
///
///     let response = fixture
///         .get("/oauth2/authorization?state=abc&client_id=clientA&redirect_uri=https%3A%2F%2Fapp.test%2Fcb")
///         .await;
///     response.assert_status(StatusCode::FOUND);
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Shared application state, for seeding and inspecting the store
    pub state: AppState,
    /// Mock identity provider
    pub upstream_mock: MockServer,
    /// Mock patient validation service
    pub validation_mock: MockServer,
}

impl TestFixture {
    /// Creates a fixture serving only the default route
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Creates a fixture with an extra `/health/v1` category that uses the
    /// local client store and its own `health` issuer
    pub async fn with_local_category() -> Self {
        Self::build(|config, upstream_mock| {
            config.categories = vec![RouteCategory {
                api_category: "/health/v1".to_string(),
                upstream_issuer: format!("{}/oauth2/health", upstream_mock.uri()),
                idp: Some("id_me".to_string()),
                client_store: ClientStore::Local,
            }];
        })
        .await
    }

    /// Creates a fixture after applying `customize` to the test configuration
    pub async fn with_config(customize: impl FnOnce(&mut ProxyConfig)) -> Self {
        Self::build(|config, _| customize(config)).await
    }

    /// Creates a fixture whose store writes can be made to fail
    pub async fn with_failing_store() -> (Self, FailingBackend) {
        let backend = FailingBackend::new();
        let fixture =
            Self::build_with_backend(|_, _| {}, Some(Backend::Failing(backend.clone()))).await;
        (fixture, backend)
    }

    async fn build(customize: impl FnOnce(&mut ProxyConfig, &MockServer)) -> Self {
        Self::build_with_backend(customize, None).await
    }

    async fn build_with_backend(
        customize: impl FnOnce(&mut ProxyConfig, &MockServer),
        backend: Option<Backend>,
    ) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let upstream_mock = MockServer::start().await;
        let validation_mock = MockServer::start().await;

        let mut config = ProxyConfig::for_test_with_mocks(&upstream_mock, &validation_mock);
        customize(&mut config, &upstream_mock);

        mount_discovery(&upstream_mock, "default").await;
        if !config.categories.is_empty() {
            mount_discovery(&upstream_mock, "health").await;
        }

        let state = match backend {
            Some(backend) => {
                let hasher =
                    SecretHasher::new(&config.hmac_secret).expect("Failed to build hasher");
                let store = DocumentStore::new(backend, hasher, &config.store);
                AppState::with_store(config, store).await
            }
            None => AppState::new(config).await,
        }
        .expect("Failed to build test state");
        let app = create_app(state.clone()).await;

        Self {
            app,
            state,
            upstream_mock,
            validation_mock,
        }
    }

    /// Initializes the test logger; repeated calls are no-ops
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Registers `client_id` with the mock admin API
    pub async fn mount_application(&self, client_id: &str, redirect_uris: &[&str]) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path(format!("/api/v1/apps/{client_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": client_id,
                "settings": {
                    "oauthClient": { "redirect_uris": redirect_uris }
                }
            })))
            .mount(&self.upstream_mock)
            .await;
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, String)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri.as_ref());
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a form-encoded POST, the way OAuth clients call the proxy
    pub async fn post_form(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        headers: &[(&str, String)],
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder
            .body(Body::from(body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_json(&self, uri: impl AsRef<str>, body: &Value) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a request through the router and collects the response
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let location = headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Non-JSON and empty bodies read as null
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);

        TestResponse {
            status,
            json,
            location,
            headers,
        }
    }
}

/// Serves a discovery document for `{uri}/oauth2/{name}`
pub async fn mount_discovery(server: &MockServer, name: &str) {
    let issuer = format!("{}/oauth2/{}", server.uri(), name);
    Mock::given(matchers::method("GET"))
        .and(matchers::path(format!(
            "/oauth2/{name}/.well-known/openid-configuration"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/v1/authorize"),
            "token_endpoint": format!("{issuer}/v1/token"),
            "userinfo_endpoint": format!("{issuer}/v1/userinfo"),
            "introspection_endpoint": format!("{issuer}/v1/introspect"),
            "revocation_endpoint": format!("{issuer}/v1/revoke"),
            "jwks_uri": format!("{issuer}/v1/keys"),
            "scopes_supported": ["openid", "profile", "offline_access", "launch/patient"],
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
            "registration_endpoint": format!("{}/oauth2/v1/clients", server.uri())
        })))
        .mount(server)
        .await;
}

/// Response captured by [`TestFixture::send`]
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub json: Value,
    /// The `Location` header, if any
    pub location: Option<String>,
    pub headers: HeaderMap,
}

impl TestResponse {
    #[track_caller]
    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status, expected,
            "Expected status {} but got {}. Response body: {}",
            expected, self.status, self.json
        );
    }
}
