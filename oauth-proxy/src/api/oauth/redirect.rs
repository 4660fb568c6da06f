use crate::errors::{found, OAuthError};
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use crate::store::records::{CorrelationRecord, STATE_INDEX};
use axum::extract::{Query, RawQuery, State};
use axum::response::{IntoResponse, Response};
use log::{debug, error, warn};
use serde::Deserialize;
use utoipa::IntoParams;

/// Callback parameters sent by the upstream authorize endpoint
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct RedirectParams {
    state: Option<String>,
    code: Option<String>,
    /// Set when the upstream refused the authorization
    error: Option<String>,
}

/// Receives the upstream callback and sends the browser back to the client
#[utoipa::path(
    get,
    path = "/oauth2/redirect",
    params(RedirectParams),
    responses(
        (status = 302, description = "Redirect to the client's registered redirect URI with the callback query"),
        (status = 400, description = "Missing or unknown state", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn redirect(
    State(state): State<AppState>,
    Query(params): Query<RedirectParams>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let Some(client_state) = params.state.as_deref().filter(|s| !s.is_empty()) else {
        return OAuthError::invalid_request("State parameter required").into_response();
    };

    let record = match state
        .store
        .query::<CorrelationRecord>(STATE_INDEX, client_state)
        .await
    {
        Ok(Some(record)) if !record.holds_tokens() => record,
        Ok(_) => {
            warn!("Callback for unknown state {}", client_state);
            return unknown_state();
        }
        Err(err) => {
            error!("Failed to look up callback state: {}", err);
            return unknown_state();
        }
    };

    if params.error.is_none() {
        if let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) {
            let hashed = state.store.hash(code);
            let saved = state
                .store
                .update::<CorrelationRecord, _>(&record.internal_state, |record| {
                    record.code = Some(hashed);
                })
                .await;
            match saved {
                Ok(Some(_)) => debug!("Attached code to request {}", record.internal_state),
                Ok(None) => warn!("Request {} expired before its code arrived", record.internal_state),
                Err(err) => error!("Failed to save the authorization code: {}", err),
            }
        }
    }

    let separator = if record.redirect_uri.contains('?') { '&' } else { '?' };
    found(&format!(
        "{}{}{}",
        record.redirect_uri,
        separator,
        raw_query.unwrap_or_default()
    ))
}

fn unknown_state() -> Response {
    OAuthError::invalid_request("The state parameter does not match a pending authorization request.")
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use crate::store::records::CODE_INDEX;
    use chrono::Utc;
    use http::StatusCode;

    async fn seed(fixture: &TestFixture, redirect_uri: &str) {
        fixture
            .state
            .store
            .put(&CorrelationRecord::new(
                "internal-1".to_string(),
                "abc123".to_string(),
                redirect_uri.to_string(),
                Utc::now().timestamp() + 600,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_state_is_not_redirected() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/oauth2/redirect?state=nope&code=xyz").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.location.is_none());
        assert_eq!(response.json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_missing_state() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/oauth2/redirect?code=xyz").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.location.is_none());
    }

    #[tokio::test]
    async fn test_code_is_hashed_and_browser_redirected() {
        let fixture = TestFixture::new().await;
        seed(&fixture, "https://app.test/cb").await;

        let response = fixture
            .get("/oauth2/redirect?code=the_fake_authorization_code&state=abc123")
            .await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(
            response.location.as_deref(),
            Some("https://app.test/cb?code=the_fake_authorization_code&state=abc123")
        );

        let store = &fixture.state.store;
        let record = store
            .query::<CorrelationRecord>(CODE_INDEX, &store.hash("the_fake_authorization_code"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.internal_state, "internal-1");
        assert!(store
            .query::<CorrelationRecord>(CODE_INDEX, "the_fake_authorization_code")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_code_not_attached_to_issued_session() {
        let fixture = TestFixture::new().await;
        let store = &fixture.state.store;
        let mut issued = CorrelationRecord::new(
            "rotated-1".to_string(),
            "abc123".to_string(),
            "https://app.test/cb".to_string(),
            Utc::now().timestamp() + 600,
        );
        issued.access_token_hash = Some(store.hash("victim_access"));
        store.put(&issued).await.unwrap();

        let response = fixture
            .get("/oauth2/redirect?state=abc123&code=attacker_code")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.location.is_none());
        assert!(store
            .query::<CorrelationRecord>(CODE_INDEX, &store.hash("attacker_code"))
            .await
            .unwrap()
            .is_none());
        let session = store
            .get::<CorrelationRecord>("rotated-1")
            .await
            .unwrap()
            .unwrap();
        assert!(session.code.is_none());
    }

    #[tokio::test]
    async fn test_code_save_failure_still_redirects() {
        let (fixture, backend) = TestFixture::with_failing_store().await;
        seed(&fixture, "https://app.test/cb").await;
        backend.fail_writes_to("OAuthRequestsV2:");

        let response = fixture
            .get("/oauth2/redirect?code=the_fake_authorization_code&state=abc123")
            .await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(
            response.location.as_deref(),
            Some("https://app.test/cb?code=the_fake_authorization_code&state=abc123")
        );
        let record = fixture
            .state
            .store
            .get::<CorrelationRecord>("internal-1")
            .await
            .unwrap()
            .unwrap();
        assert!(record.code.is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_is_relayed_without_code() {
        let fixture = TestFixture::new().await;
        seed(&fixture, "https://app.test/cb?tenant=1").await;

        let response = fixture
            .get("/oauth2/redirect?state=abc123&error=access_denied&error_description=User+cancelled")
            .await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(
            response.location.as_deref(),
            Some("https://app.test/cb?tenant=1&state=abc123&error=access_denied&error_description=User+cancelled")
        );
        let record = fixture
            .state
            .store
            .get::<CorrelationRecord>("internal-1")
            .await
            .unwrap()
            .unwrap();
        assert!(record.code.is_none());
    }
}
