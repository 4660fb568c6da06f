//! Transparent relays to the route's upstream endpoints

use crate::errors::OAuthError;
use crate::state::{AppState, RouteContext};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderName, StatusCode};
use std::error::Error as StdError;

/// Request bodies forwarded upstream are small form or JSON payloads
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub(super) async fn keys(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
    req: Request,
) -> Response {
    relay(&state, route.issuer.jwks_uri.as_deref(), req).await
}

pub(super) async fn userinfo(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
    req: Request,
) -> Response {
    relay(&state, route.issuer.userinfo_endpoint.as_deref(), req).await
}

pub(super) async fn introspect(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
    req: Request,
) -> Response {
    relay(&state, route.issuer.introspection_endpoint.as_deref(), req).await
}

pub(super) async fn revoke(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
    req: Request,
) -> Response {
    relay(&state, route.issuer.revocation_endpoint.as_deref(), req).await
}

fn is_hop_header(name: &HeaderName) -> bool {
    name == HOST || name == CONTENT_LENGTH || name == TRANSFER_ENCODING
}

/// Forwards method, headers and body to `target` and relays the answer as-is
async fn relay(state: &AppState, target: Option<&str>, req: Request) -> Response {
    let Some(target) = target else {
        return OAuthError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            Some("The upstream issuer does not publish this endpoint.".to_string()),
        )
        .into_response();
    };

    let url = match req.uri().query() {
        Some(query) => format!("{target}?{query}"),
        None => target.to_string(),
    };
    log::debug!("Forwarding {} {} upstream to {}", req.method(), req.uri().path(), url);

    let mut builder = state.http.request(req.method().clone(), &url);
    for (name, value) in req.headers() {
        if !is_hop_header(name) {
            builder = builder.header(name, value);
        }
    }

    let body = match to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return OAuthError::invalid_request("Failed to read request body").into_response()
        }
    };
    if !body.is_empty() {
        builder = builder.body(body);
    }

    match builder.send().await {
        Ok(upstream) => {
            let status = upstream.status();
            let headers = upstream.headers().clone();
            let bytes = match upstream.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::error!("Failed to read upstream response body: {}", e);
                    return (StatusCode::BAD_GATEWAY, "Failed to read response body")
                        .into_response();
                }
            };

            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            for (name, value) in headers.iter() {
                if !is_hop_header(name) {
                    response.headers_mut().append(name.clone(), value.clone());
                }
            }
            response
        }
        Err(e) => {
            log::error!(
                "Failed to relay request to {}: {} (source: {:?})",
                url,
                e,
                e.source()
            );
            let message = if e.is_timeout() {
                "Request timed out while connecting to the upstream issuer"
            } else if e.is_connect() {
                "Connection error occurred while connecting to the upstream issuer"
            } else {
                "Failed to relay the request to the upstream issuer"
            };
            (StatusCode::BAD_GATEWAY, message).into_response()
        }
    }
}
