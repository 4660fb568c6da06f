use http::StatusCode;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub mod admin;
pub mod issuer;
pub mod token;
pub mod validation;

pub(crate) use admin::AdminClient;
pub(crate) use issuer::IssuerMetadata;
pub(crate) use token::{ClientAuth, TokenSet};
pub(crate) use validation::PatientValidator;

/// Errors that can occur when calling the upstream identity provider or the
/// validation endpoint
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream rejected the request with {status}: {error}")]
    OAuth {
        status: StatusCode,
        error: String,
        description: Option<String>,
    },

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Status code reported by the upstream, if the request got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::OAuth { status, .. } | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::NotFound(_) => Some(StatusCode::NOT_FOUND),
            Self::Http(err) => err.status(),
            Self::Malformed(_) => None,
        }
    }
}

/// Error body shapes the upstream is known to send
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    OAuth {
        error: String,
        error_description: Option<String>,
    },
    Admin {
        #[serde(rename = "errorCode")]
        error_code: String,
        #[serde(rename = "errorSummary")]
        error_summary: Option<String>,
    },
}

/// Turns a non-success response into an [`UpstreamError`], keeping the
/// upstream's own error code when the body carries one
pub(crate) async fn error_from_response(response: reqwest::Response) -> UpstreamError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return UpstreamError::Http(err),
    };
    debug!("Upstream responded {} with body: {}", status, body);
    parse_error_body(status, body)
}

fn parse_error_body(status: StatusCode, body: String) -> UpstreamError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody::OAuth {
            error,
            error_description,
        }) => UpstreamError::OAuth {
            status,
            error,
            description: error_description,
        },
        Ok(ErrorBody::Admin {
            error_code,
            error_summary,
        }) => UpstreamError::OAuth {
            status,
            error: error_code,
            description: error_summary,
        },
        Err(_) => UpstreamError::UnexpectedStatus { status, body },
    }
}
