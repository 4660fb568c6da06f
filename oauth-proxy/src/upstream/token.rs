use super::{error_from_response, UpstreamError};
use chrono::Utc;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

/// How the proxy authenticates to the upstream token endpoint on the
/// client's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_secret_basic`
    Basic {
        client_id: String,
        client_secret: String,
    },
    /// Public client, `token_endpoint_auth_method=none`
    None { client_id: String },
}

impl ClientAuth {
    pub fn client_id(&self) -> &str {
        match self {
            Self::Basic { client_id, .. } | Self::None { client_id } => client_id,
        }
    }
}

/// Token set as returned by the upstream token endpoint
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl TokenSet {
    /// Lifetime in seconds from now, derived from `expires_at` when the
    /// upstream only sent an absolute timestamp
    pub fn expires_in_secs(&self) -> Option<u64> {
        self.expires_in.or_else(|| {
            self.expires_at
                .map(|expires_at| u64::try_from(expires_at - Utc::now().timestamp()).unwrap_or(0))
        })
    }
}

/// Posts a token request to `token_endpoint`, authenticating as `auth`.
///
/// `form` carries every grant parameter except the client credentials.
pub async fn request_tokens(
    http: &Client,
    token_endpoint: &str,
    auth: &ClientAuth,
    mut form: Vec<(String, String)>,
) -> Result<TokenSet, UpstreamError> {
    debug!(
        "Requesting tokens from {} for client {}",
        token_endpoint,
        auth.client_id()
    );
    let request = match auth {
        ClientAuth::Basic {
            client_id,
            client_secret,
        } => http
            .post(token_endpoint)
            .basic_auth(client_id, Some(client_secret)),
        ClientAuth::None { client_id } => {
            form.push(("client_id".to_string(), client_id.clone()));
            http.post(token_endpoint)
        }
    };
    send_form(request, &form).await
}

/// Posts a request that carries its own client authentication in the body,
/// such as a JWT-bearer client assertion
pub async fn request_tokens_with_assertion(
    http: &Client,
    token_endpoint: &str,
    form: &[(String, String)],
) -> Result<TokenSet, UpstreamError> {
    debug!("Requesting client credentials tokens from {}", token_endpoint);
    send_form(http.post(token_endpoint), form).await
}

async fn send_form(
    request: reqwest::RequestBuilder,
    form: &[(String, String)],
) -> Result<TokenSet, UpstreamError> {
    let response = request
        .header(http::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    response
        .json::<TokenSet>()
        .await
        .map_err(|e| UpstreamError::Malformed(format!("token response: {e}")))
}
