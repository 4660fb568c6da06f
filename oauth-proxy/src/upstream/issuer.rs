use super::{error_from_response, UpstreamError};
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

/// Discovered OpenID provider metadata for one upstream issuer
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IssuerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// The full document as discovered, overrides applied
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

impl IssuerMetadata {
    /// Fetches `{issuer}/.well-known/openid-configuration` and applies the
    /// configured overrides on top of it
    pub async fn discover(
        http: &Client,
        issuer: &str,
        overrides: Option<&HashMap<String, String>>,
    ) -> Result<Self, UpstreamError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        debug!("Discovering issuer metadata at {}", url);

        let response = http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let mut raw: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("discovery document: {e}")))?;
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                raw.insert(key.clone(), Value::String(value.clone()));
            }
        }

        let mut metadata: IssuerMetadata = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| UpstreamError::Malformed(format!("discovery document: {e}")))?;
        metadata.raw = raw;
        info!("Discovered upstream issuer {}", metadata.issuer);
        Ok(metadata)
    }

    /// Id of the upstream authorization server, the last path segment of the issuer
    pub fn authorization_server_id(&self) -> Option<String> {
        let url = Url::parse(&self.issuer).ok()?;
        url.path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    async fn mount_discovery(server: &MockServer) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/oauth2/default/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": format!("{}/oauth2/default", server.uri()),
                "authorization_endpoint": format!("{}/oauth2/default/v1/authorize", server.uri()),
                "token_endpoint": format!("{}/oauth2/default/v1/token", server.uri()),
                "jwks_uri": format!("{}/oauth2/default/v1/keys", server.uri()),
                "scopes_supported": ["openid", "launch/patient"]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_discover() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        let metadata = IssuerMetadata::discover(
            &Client::new(),
            &format!("{}/oauth2/default", server.uri()),
            None,
        )
        .await
        .unwrap();

        assert_eq!(
            metadata.token_endpoint,
            format!("{}/oauth2/default/v1/token", server.uri())
        );
        assert!(metadata.userinfo_endpoint.is_none());
        assert_eq!(metadata.authorization_server_id().as_deref(), Some("default"));
        assert!(metadata.raw.contains_key("scopes_supported"));
    }

    #[tokio::test]
    async fn test_discover_with_overrides() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        let overrides = HashMap::from([(
            "token_endpoint".to_string(),
            "https://token.override.test/token".to_string(),
        )]);
        let metadata = IssuerMetadata::discover(
            &Client::new(),
            &format!("{}/oauth2/default/", server.uri()),
            Some(&overrides),
        )
        .await
        .unwrap();

        assert_eq!(metadata.token_endpoint, "https://token.override.test/token");
        assert_eq!(
            metadata.raw.get("token_endpoint"),
            Some(&json!("https://token.override.test/token"))
        );
    }

    #[tokio::test]
    async fn test_discover_failure() {
        let server = MockServer::start().await;
        let result = IssuerMetadata::discover(
            &Client::new(),
            &format!("{}/oauth2/missing", server.uri()),
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
