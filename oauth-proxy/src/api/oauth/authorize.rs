use crate::config::routes::rewrite_idp;
use crate::config::ClientStore;
use crate::errors::{found, redirect_with_error, OAuthError};
use crate::openapi::OAUTH_TAG;
use crate::state::{AppState, RouteContext};
use crate::store::records::{ClientRecord, CorrelationRecord, STATE_INDEX};
use axum::extract::{Query, RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::Utc;
use log::{error, info, warn};
use serde::Deserialize;
use url::{form_urlencoded, Url};
use utoipa::IntoParams;
use uuid::Uuid;

/// Query accepted by the authorize endpoint. Every other parameter is
/// forwarded upstream untouched.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct AuthorizeParams {
    /// Opaque client correlation value, returned unchanged
    state: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    /// Audience the client expects in the access token
    aud: Option<String>,
    /// Identity provider slug
    idp: Option<String>,
    scope: Option<String>,
    /// SMART launch context, raw or base64 encoded
    launch: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn is_valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn redirect_mismatch(redirect_uri: &str) -> OAuthError {
    OAuthError::invalid_request(format!(
        "The redirect URI specified by the application does not match any of the \
         registered redirect URIs. Erroneous redirect URI: {redirect_uri}"
    ))
}

/// Starts an authorization request
#[utoipa::path(
    get,
    path = "/oauth2/authorization",
    params(AuthorizeParams),
    responses(
        (status = 302, description = "Redirect to the upstream authorize endpoint, or to the client with an error"),
        (status = 400, description = "The client or its redirect URI could not be verified", body = OAuthError),
        (status = 500, description = "The authorization request could not be recorded", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn authorize(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
    Query(params): Query<AuthorizeParams>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let client_id = non_empty(&params.client_id).unwrap_or_default();
    if !is_valid_client_id(client_id) {
        error!("No valid client_id was found");
        return OAuthError::unauthorized_client(
            "The client specified by the application is not valid.",
        )
        .into_response();
    }

    let Some(client_redirect) = non_empty(&params.redirect_uri) else {
        error!("No valid redirect_uri was found for client {}", client_id);
        return OAuthError::invalid_request(
            "There was no redirect URI specified by the application.",
        )
        .into_response();
    };

    if let Err(err) = verify_client(&state, &route, client_id, client_redirect).await {
        return err.into_response();
    }

    // The redirect URI is verified from here on, so errors go back to the client
    let Some(client_state) = non_empty(&params.state) else {
        error!("No valid state parameter was found for client {}", client_id);
        return redirect_with_error(
            client_redirect,
            &OAuthError::invalid_request("State parameter required"),
        );
    };

    if let Some(aud) = non_empty(&params.aud) {
        check_audience(&state, &route, aud).await;
    }

    if let Err(err) = record_request(&state, client_state, client_redirect).await {
        return err.into_response();
    }

    let location = match upstream_location(
        &state,
        &route,
        raw_query.as_deref().unwrap_or_default(),
        non_empty(&params.idp),
    ) {
        Ok(location) => location,
        Err(err) => return err.into_response(),
    };

    info!(
        "Authorization begun for client {} (scope: {})",
        client_id,
        params.scope.as_deref().unwrap_or("")
    );
    if params.launch.is_some() {
        info!("Launch context supplied for client {}", client_id);
    }
    found(location.as_str())
}

/// Confirms the client exists and has registered `redirect_uri`
async fn verify_client(
    state: &AppState,
    route: &RouteContext,
    client_id: &str,
    redirect_uri: &str,
) -> Result<(), OAuthError> {
    let registered = match route.client_store {
        ClientStore::Local => match state.store.get::<ClientRecord>(client_id).await {
            Ok(Some(client)) => client.redirect_uris,
            Ok(None) => {
                error!("Client {} is not in the local client store", client_id);
                return Err(redirect_mismatch(redirect_uri));
            }
            Err(err) => {
                error!("Failed to read client {} from the store: {}", client_id, err);
                return Err(redirect_mismatch(redirect_uri));
            }
        },
        ClientStore::Upstream => match state.admin.registered_redirect_uris(client_id).await {
            Ok(uris) => uris,
            Err(err) => {
                error!("Could not get the upstream application {}: {}", client_id, err);
                return Err(redirect_mismatch(redirect_uri));
            }
        },
    };

    if registered.iter().any(|uri| uri == redirect_uri) {
        Ok(())
    } else {
        warn!(
            "Client {} requested unregistered redirect URI {}",
            client_id, redirect_uri
        );
        Err(redirect_mismatch(redirect_uri))
    }
}

/// Warns when `aud` is not configured on the route's authorization server
async fn check_audience(state: &AppState, route: &RouteContext, aud: &str) {
    let Some(server_id) = route.issuer.authorization_server_id() else {
        warn!("Cannot derive an authorization server id from {}", route.issuer.issuer);
        return;
    };
    match state.admin.audiences(&server_id).await {
        Ok(audiences) if !audiences.iter().any(|expected| expected == aud) => {
            warn!(
                "Unexpected audience {} (expected one of {:?})",
                aud, audiences
            );
        }
        Ok(_) => {}
        Err(err) => error!("Unable to get the authorization server {}: {}", server_id, err),
    }
}

/// Writes the `state -> redirect_uri` record, reusing the key of an in-flight
/// request with the same state
async fn record_request(
    state: &AppState,
    client_state: &str,
    redirect_uri: &str,
) -> Result<(), OAuthError> {
    let existing = match state
        .store
        .query::<CorrelationRecord>(STATE_INDEX, client_state)
        .await
    {
        Ok(existing) => existing,
        Err(err) => {
            warn!("State lookup failed, starting a new request record: {}", err);
            None
        }
    };
    let internal_state = existing
        .filter(|record| !record.holds_tokens())
        .map(|record| record.internal_state)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let record = CorrelationRecord::new(
        internal_state,
        client_state.to_string(),
        redirect_uri.to_string(),
        Utc::now().timestamp() + state.config.store.authorize_ttl as i64,
    );
    state.store.put(&record).await.map_err(|err| {
        error!(
            "Failed to save client redirect URI {} in authorize handler",
            redirect_uri
        );
        OAuthError::from(err)
    })
}

/// Upstream authorize URL carrying the original query, with `redirect_uri`
/// pointing at this proxy and `idp` resolved
fn upstream_location(
    state: &AppState,
    route: &RouteContext,
    raw_query: &str,
    requested_idp: Option<&str>,
) -> Result<Url, OAuthError> {
    let mut location = Url::parse(&route.issuer.authorization_endpoint).map_err(|err| {
        error!(
            "Invalid upstream authorization endpoint {}: {}",
            route.issuer.authorization_endpoint, err
        );
        OAuthError::server_error("The upstream authorization endpoint is misconfigured.")
    })?;

    let idp = rewrite_idp(
        &state.config.idps,
        &[
            requested_idp,
            route.idp.as_deref(),
            state.config.idp.as_deref(),
        ],
    );
    let forwarded = form_urlencoded::parse(raw_query.as_bytes())
        .into_owned()
        .filter(|(name, _)| name != "redirect_uri" && name != "idp")
        .collect::<Vec<_>>();

    {
        let mut query = location.query_pairs_mut();
        query.extend_pairs(&forwarded);
        query.append_pair("redirect_uri", &state.config.redirect_uri());
        if let Some(idp) = &idp {
            query.append_pair("idp", idp);
        }
    }
    Ok(location)
}
