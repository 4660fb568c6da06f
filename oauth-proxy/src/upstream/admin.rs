use super::{error_from_response, UpstreamError};
use http::StatusCode;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

/// Client for the upstream provider's management API
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    api_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct Application {
    settings: ApplicationSettings,
}

#[derive(Debug, Deserialize)]
struct ApplicationSettings {
    #[serde(rename = "oauthClient")]
    oauth_client: OAuthClientSettings,
}

#[derive(Debug, Deserialize)]
struct OAuthClientSettings {
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationServer {
    #[serde(default)]
    audiences: Vec<String>,
}

impl AdminClient {
    pub fn new(http: Client, api_url: &str, api_token: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.api_url, path);
        debug!("Calling admin API {}", url);

        let response = self
            .http
            .get(&url)
            .header(
                http::header::AUTHORIZATION,
                format!("SSWS {}", self.api_token),
            )
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| UpstreamError::Malformed(format!("{path}: {e}"))),
            StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(path.to_string())),
            _ => Err(error_from_response(response).await),
        }
    }

    /// Redirect URIs registered for an application
    pub async fn registered_redirect_uris(
        &self,
        client_id: &str,
    ) -> Result<Vec<String>, UpstreamError> {
        let application: Application = self.fetch(&format!("/api/v1/apps/{client_id}")).await?;
        Ok(application.settings.oauth_client.redirect_uris)
    }

    /// Audiences configured on an authorization server
    pub async fn audiences(&self, server_id: &str) -> Result<Vec<String>, UpstreamError> {
        let server: AuthorizationServer = self
            .fetch(&format!("/api/v1/authorizationServers/{server_id}"))
            .await?;
        Ok(server.audiences)
    }
}
