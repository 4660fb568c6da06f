use super::{error_from_response, UpstreamError};
use crate::config::ValidationConfig;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// Client for the token validation endpoint that resolves patient identifiers
#[derive(Debug, Clone)]
pub struct PatientValidator {
    http: Client,
    endpoint: String,
    post_endpoint: Option<String>,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    data: ValidationData,
}

#[derive(Debug, Deserialize)]
struct ValidationData {
    attributes: ValidationAttributes,
}

#[derive(Debug, Deserialize)]
struct ValidationAttributes {
    #[serde(default)]
    va_identifiers: Option<Identifiers>,
}

#[derive(Debug, Deserialize)]
struct Identifiers {
    #[serde(default)]
    icn: Option<String>,
}

impl PatientValidator {
    pub fn new(http: Client, config: &ValidationConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            post_endpoint: config.post_endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Validates `access_token` and returns the patient ICN it is bound to.
    ///
    /// `Ok(None)` means the token validated but carries no patient identifier.
    pub async fn patient_icn(
        &self,
        access_token: &str,
        aud: Option<&Value>,
    ) -> Result<Option<String>, UpstreamError> {
        let request = match &self.post_endpoint {
            Some(post_endpoint) => {
                debug!("Validating token against {}", post_endpoint);
                self.http
                    .post(post_endpoint)
                    .json(&json!({ "aud": aud }))
            }
            None => {
                debug!("Validating token against {}", self.endpoint);
                self.http.get(&self.endpoint)
            }
        };

        let response = request
            .header("apiKey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: ValidationResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("validation response: {e}")))?;
        Ok(body
            .data
            .attributes
            .va_identifiers
            .and_then(|identifiers| identifiers.icn)
            .filter(|icn| !icn.is_empty()))
    }
}
