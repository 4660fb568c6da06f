use crate::errors::OAuthError;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use crate::store::records::LaunchContextRecord;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use log::{error, warn};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct LaunchResponse {
    /// Launch context bound to the bearer token at issuance
    launch: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn invalid_token() -> Response {
    OAuthError::new(
        StatusCode::UNAUTHORIZED,
        "invalid_token",
        Some("The access token is missing, invalid, or has expired.".to_string()),
    )
    .into_response()
}

/// Returns the launch context stored for the presented access token
#[utoipa::path(
    get,
    path = "/oauth2/launch",
    responses(
        (status = 200, description = "Launch context found", body = LaunchResponse),
        (status = 401, description = "Missing or unknown bearer token", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn launch(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        warn!("Launch lookup without a bearer token");
        return invalid_token();
    };

    match state
        .store
        .get::<LaunchContextRecord>(&state.store.hash(token))
        .await
    {
        Ok(Some(record)) => Json(LaunchResponse {
            launch: record.launch,
        })
        .into_response(),
        Ok(None) => invalid_token(),
        Err(err) => {
            error!("Could not read the launch context: {}", err);
            OAuthError::from(err).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, "bearer the_token".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("the_token"));
    }

    #[tokio::test]
    async fn test_launch_lookup() {
        let fixture = TestFixture::new().await;
        let store = &fixture.state.store;
        store
            .put(&LaunchContextRecord {
                access_token_hash: store.hash("issued_access"),
                launch: "1234V5678".to_string(),
                expires_on: Utc::now().timestamp() + 600,
            })
            .await
            .unwrap();

        let response = fixture
            .get_with_headers(
                "/oauth2/launch",
                &[("authorization", "Bearer issued_access".to_string())],
            )
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json, json!({ "launch": "1234V5678" }));

        fixture
            .get_with_headers(
                "/oauth2/launch",
                &[("authorization", "Bearer someone_else".to_string())],
            )
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_bearer() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/oauth2/launch").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["error"], "invalid_token");
    }
}
