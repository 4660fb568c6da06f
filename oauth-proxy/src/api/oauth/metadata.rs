use crate::headers::presets;
use crate::openapi::OAUTH_TAG;
use crate::state::{AppState, RouteContext};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{Map, Value};

/// Discovery fields republished from the upstream document
const METADATA_WHITELIST: &[&str] = &[
    "issuer",
    "authorization_endpoint",
    "token_endpoint",
    "userinfo_endpoint",
    "introspection_endpoint",
    "revocation_endpoint",
    "jwks_uri",
    "scopes_supported",
    "response_types_supported",
    "response_modes_supported",
    "grant_types_supported",
    "subject_types_supported",
    "id_token_signing_alg_values_supported",
    "token_endpoint_auth_methods_supported",
    "revocation_endpoint_auth_methods_supported",
    "claims_supported",
    "code_challenge_methods_supported",
    "introspection_endpoint_auth_methods_supported",
    "request_parameter_supported",
    "request_object_signing_alg_values_supported",
];

const METADATA_MAX_AGE_SECS: u32 = 300;

/// Endpoints served by this proxy in place of the upstream ones
fn endpoint_rewrites(prefix: &str) -> [(&'static str, String); 6] {
    [
        ("authorization_endpoint", format!("{prefix}/authorization")),
        ("token_endpoint", format!("{prefix}/token")),
        ("userinfo_endpoint", format!("{prefix}/userinfo")),
        ("revocation_endpoint", format!("{prefix}/revoke")),
        ("introspection_endpoint", format!("{prefix}/introspect")),
        ("jwks_uri", format!("{prefix}/keys")),
    ]
}

fn rewrite_metadata(upstream: &Map<String, Value>, prefix: &str) -> Map<String, Value> {
    let mut metadata: Map<String, Value> = METADATA_WHITELIST
        .iter()
        .filter_map(|key| upstream.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect();
    for (key, url) in endpoint_rewrites(prefix) {
        metadata.insert(key.to_string(), Value::String(url));
    }
    metadata
}

/// OpenID provider metadata for this route, pointing at the proxy's endpoints
#[utoipa::path(
    get,
    path = "/oauth2/.well-known/openid-configuration",
    responses(
        (status = 200, description = "Filtered provider metadata", content_type = "application/json")
    ),
    tag = OAUTH_TAG
)]
pub(crate) async fn openid_configuration(
    State(state): State<AppState>,
    Extension(route): Extension<RouteContext>,
) -> Response {
    let prefix = format!(
        "{}{}{}",
        state.config.host.trim_end_matches('/'),
        state.config.well_known_base_path.trim_end_matches('/'),
        route.api_category
    );
    let mut response = Json(rewrite_metadata(&route.issuer.raw, &prefix)).into_response();
    presets::public_cache(METADATA_MAX_AGE_SECS).apply(&mut response);
    response
}
