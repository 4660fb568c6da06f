use crate::errors::OAuthError;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use crate::store::records::{CorrelationRecord, ACCESS_TOKEN_INDEX};
use axum::extract::{FromRequest, Request, State};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct ClaimsRequest {
    /// Access token previously issued through this proxy
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct ClaimsResponse {
    /// Issuer that minted the token
    iss: String,
}

/// Accepts the claims request as JSON or form-encoded
pub(crate) struct ClaimsRequestExtractor(ClaimsRequest);

impl<S> FromRequest<S> for ClaimsRequestExtractor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/json") {
            match Json::<ClaimsRequest>::from_request(req, state).await {
                Ok(Json(request)) => Ok(Self(request)),
                Err(_) => Err(
                    OAuthError::invalid_request("Invalid JSON in request body").into_response(),
                ),
            }
        } else {
            match Form::<ClaimsRequest>::from_request(req, state).await {
                Ok(Form(request)) => Ok(Self(request)),
                Err(_) => Err(OAuthError::invalid_request("Invalid form data in request body")
                    .into_response()),
            }
        }
    }
}

/// Returns the issuer of an access token issued through this proxy
#[utoipa::path(
    post,
    path = "/oauth2/claims",
    request_body = ClaimsRequest,
    responses(
        (status = 200, description = "Token is known", body = ClaimsResponse),
        (status = 400, description = "Missing token", body = OAuthError),
        (status = 403, description = "Token is unknown, expired, or has no issuer")
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn claims(
    State(state): State<AppState>,
    ClaimsRequestExtractor(request): ClaimsRequestExtractor,
) -> Response {
    let Some(token) = request.token.filter(|token| !token.is_empty()) else {
        return OAuthError::invalid_request("Missing parameter: token").into_response();
    };

    let document = match state
        .store
        .query::<CorrelationRecord>(ACCESS_TOKEN_INDEX, &state.store.hash(&token))
        .await
    {
        Ok(document) => document,
        Err(err) => {
            error!("Error retrieving token claims: {}", err);
            return OAuthError::from(err).into_response();
        }
    };

    match document.and_then(|document| document.iss) {
        Some(iss) => Json(ClaimsResponse { iss }).into_response(),
        None => StatusCode::FORBIDDEN.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use chrono::Utc;
    use serde_json::{json, Value};

    async fn seed(fixture: &TestFixture, iss: Option<&str>) {
        let store = &fixture.state.store;
        let mut record = CorrelationRecord::new(
            "internal-1".to_string(),
            "abc123".to_string(),
            "https://app.test/cb".to_string(),
            Utc::now().timestamp() + 600,
        );
        record.access_token_hash = Some(store.hash("issued_access"));
        record.iss = iss.map(str::to_string);
        store.put(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_token() {
        let fixture = TestFixture::new().await;
        let response = fixture.post_form("/oauth2/claims", &[], &[]).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json,
            json!({
                "error": "invalid_request",
                "error_description": "Missing parameter: token"
            })
        );
    }

    #[tokio::test]
    async fn test_known_token_form() {
        let fixture = TestFixture::new().await;
        seed(&fixture, Some("https://idp.test/oauth2/default")).await;

        let response = fixture
            .post_form("/oauth2/claims", &[("token", "issued_access")], &[])
            .await;

        response.assert_status(StatusCode::OK);
        assert_eq!(
            response.json,
            json!({ "iss": "https://idp.test/oauth2/default" })
        );
    }

    #[tokio::test]
    async fn test_known_token_json() {
        let fixture = TestFixture::new().await;
        seed(&fixture, Some("https://idp.test/oauth2/default")).await;

        let response = fixture
            .post_json("/oauth2/claims", &json!({ "token": "issued_access" }))
            .await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.json["iss"], "https://idp.test/oauth2/default");
    }

    #[tokio::test]
    async fn test_unknown_or_issuerless_token() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_form("/oauth2/claims", &[("token", "never_issued")], &[])
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json, Value::Null);

        seed(&fixture, None).await;
        fixture
            .post_form("/oauth2/claims", &[("token", "issued_access")], &[])
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_raw_token_is_not_accepted() {
        let fixture = TestFixture::new().await;
        let store = &fixture.state.store;
        let mut record = CorrelationRecord::new(
            "internal-1".to_string(),
            "abc123".to_string(),
            "https://app.test/cb".to_string(),
            Utc::now().timestamp() + 600,
        );
        record.access_token_hash = Some("raw_access".to_string());
        record.iss = Some("https://idp.test".to_string());
        store.put(&record).await.unwrap();

        fixture
            .post_form("/oauth2/claims", &[("token", "raw_access")], &[])
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
