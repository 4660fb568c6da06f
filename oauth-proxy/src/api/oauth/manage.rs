use crate::errors::{found, OAuthError};
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Sends the browser to the account management page
#[utoipa::path(
    get,
    path = "/oauth2/manage",
    responses(
        (status = 302, description = "Redirect to the account management page"),
        (status = 404, description = "No management page is configured", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn manage(State(state): State<AppState>) -> Response {
    match state.config.manage_endpoint.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => found(endpoint),
        _ => OAuthError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            Some("No manage url defined for this endpoint.".to_string()),
        )
        .into_response(),
    }
}
