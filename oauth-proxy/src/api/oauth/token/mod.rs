//! Token endpoint: exchanges codes and refresh tokens with the upstream
//! provider, rotating the stored correlation record on every issuance.

mod client_auth;
mod grant;
pub(crate) mod patient;
mod response;

pub(crate) use response::TokenResponse;

use crate::errors::OAuthError;
use crate::openapi::OAUTH_TAG;
use crate::state::{AppState, RouteContext};
use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::Extension;
use grant::{static_patient, Grant, PulledDocument, TokenContext};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use log::{info, warn};
use patient::{AccessTokenClaims, LAUNCH_PATIENT_SCOPE};
use serde_json::{Map, Value};

/// Token request parameters, read from a form-encoded or JSON body.
///
/// Bodies without a JSON content type are parsed as form data whatever
/// their declared type. JSON strings are taken as-is and other scalars by
/// their JSON text. Nulls are dropped.
pub(crate) struct TokenParams(Vec<(String, String)>);

impl<S> FromRequest<S> for TokenParams
where
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let body = Bytes::from_request(req, state).await.map_err(|err| {
            warn!("Could not read the token request body: {}", err);
            OAuthError::invalid_request("Invalid request body")
        })?;

        if !is_json {
            return Ok(Self(
                url::form_urlencoded::parse(&body).into_owned().collect(),
            ));
        }
        if body.is_empty() {
            return Ok(Self(Vec::new()));
        }

        let fields: Map<String, Value> = serde_json::from_slice(&body).map_err(|err| {
            warn!("Invalid JSON token request: {}", err);
            OAuthError::invalid_request("Invalid JSON in request body")
        })?;
        Ok(Self(
            fields
                .into_iter()
                .filter_map(|(name, value)| match value {
                    Value::Null => None,
                    Value::String(value) => Some((name, value)),
                    other => Some((name, other.to_string())),
                })
                .collect(),
        ))
    }
}

fn grant_type(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == "grant_type")
        .map(|(_, value)| value.as_str())
}

/// Issues tokens for the `authorization_code`, `refresh_token` and
/// `client_credentials` grants
#[utoipa::path(
    post,
    path = "/oauth2/token",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "OAuth token request, form-encoded or JSON"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Malformed body, unsupported grant or unknown code", body = OAuthError),
        (status = 401, description = "Client authentication failed", body = OAuthError),
        (status = 503, description = "No patient could be resolved for a launch/patient token", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn token(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
    headers: HeaderMap,
    TokenParams(mut params): TokenParams,
) -> Result<TokenResponse, OAuthError> {
    let grant = Grant::from_grant_type(grant_type(&params));
    if grant == Grant::Unsupported {
        return Err(Grant::unsupported_error());
    }

    let client = if grant.authenticates_client() {
        Some(client_auth::authenticate(
            &headers,
            &mut params,
            state.config.enable_pkce_authorization_flow,
        )?)
    } else {
        None
    };

    let ctx = TokenContext {
        state: &state,
        route: &route,
        client,
        params,
    };

    let document = grant.pull_document(&ctx).await?;
    if let Some(PulledDocument::StaticTokens(record)) = &document {
        let patient = static_patient(record)?;
        info!("Serving static tokens");
        return Ok(TokenResponse {
            patient,
            ..TokenResponse::from_static(record)
        });
    }

    let tokens = grant.acquire_tokens(&ctx).await?;
    let echoed_state = match &document {
        Some(document) => grant.save_document(&ctx, document, &tokens).await?,
        None => None,
    };

    let claims = AccessTokenClaims::decode(&tokens.access_token);
    let patient = if claims.has_scope(LAUNCH_PATIENT_SCOPE) {
        Some(grant.resolve_patient(&ctx, &tokens, &claims).await?)
    } else {
        None
    };

    info!(
        "Tokens issued via {:?} for client {}",
        grant,
        ctx.client
            .as_ref()
            .map(|client| client.client_id())
            .or_else(|| ctx.param("client_id"))
            .unwrap_or("unknown")
    );
    Ok(TokenResponse {
        patient,
        state: echoed_state,
        ..TokenResponse::from_token_set(&tokens)
    })
}
