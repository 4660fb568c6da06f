use crate::store::StoreError;
use crate::upstream::UpstreamError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use log::error;
use serde::Serialize;
use url::form_urlencoded;
use utoipa::ToSchema;

const UPSTREAM_FAILURE: &str = "An error occurred while contacting the identity provider.";

/// OAuth error returned to the caller as `{error, error_description}`
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OAuthError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl OAuthError {
    pub fn new<S: ToString>(status_code: StatusCode, error: S, description: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description,
            status_code,
        }
    }

    /// 400 `invalid_request`
    pub fn invalid_request<S: ToString>(description: S) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            Some(description.to_string()),
        )
    }

    /// 401 `invalid_client`
    pub fn invalid_client<S: ToString>(description: S) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            Some(description.to_string()),
        )
    }

    /// 400 `unauthorized_client`
    pub fn unauthorized_client<S: ToString>(description: S) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            Some(description.to_string()),
        )
    }

    /// 400 `unsupported_grant_type`
    pub fn unsupported_grant_type<S: ToString>(description: S) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            Some(description.to_string()),
        )
    }

    /// `invalid_grant` with a caller-chosen status
    pub fn invalid_grant<S: ToString>(status_code: StatusCode, description: S) -> Self {
        Self::new(status_code, "invalid_grant", Some(description.to_string()))
    }

    /// 500 `server_error`
    pub fn server_error<S: ToString>(description: S) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            Some(description.to_string()),
        )
    }
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{} ({}): {}", self.error, self.status_code, description),
            None => write!(f, "{} ({})", self.error, self.status_code),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

impl From<UpstreamError> for OAuthError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::OAuth {
                status,
                error,
                description,
            } => Self::new(status, error, description),
            other => {
                let status = other
                    .status()
                    .filter(|status| status.is_client_error() || status.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                error!("Upstream request failed: {}", other);
                Self::new(
                    status,
                    "server_error",
                    Some(UPSTREAM_FAILURE.to_string()),
                )
            }
        }
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        error!("Document store failure: {}", err);
        Self::server_error("An internal error occurred while accessing stored state.")
    }
}

/// `302 Found` pointing at `location`
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(_) => OAuthError::invalid_request("The redirect URI is not a valid header value.")
            .into_response(),
    }
}

/// Delivers an error to a verified client redirect URI as query parameters
pub fn redirect_with_error(redirect_uri: &str, err: &OAuthError) -> Response {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("error", &err.error);
    if let Some(description) = &err.error_description {
        query.append_pair("error_description", description);
    }
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    found(&format!("{}{}{}", redirect_uri, separator, query.finish()))
}
