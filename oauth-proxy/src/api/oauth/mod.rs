pub(crate) mod authorize;
pub(crate) mod claims;
pub(crate) mod launch;
pub(crate) mod manage;
pub(crate) mod metadata;
mod passthrough;
pub(crate) mod redirect;
pub(crate) mod token;

use crate::state::{AppState, RouteContext};
use axum::routing::{get, post};
use axum::{Extension, Router};

/// Routes served for every API category, relative to the category prefix
fn category_router() -> Router<AppState> {
    Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(metadata::openid_configuration),
        )
        .route("/authorization", get(authorize::authorize))
        .route("/redirect", get(redirect::redirect))
        .route("/token", post(token::token))
        .route("/claims", post(claims::claims))
        .route("/launch", get(launch::launch))
        .route("/manage", get(manage::manage))
        .route("/keys", get(passthrough::keys))
        .route("/userinfo", get(passthrough::userinfo))
        .route("/introspect", post(passthrough::introspect))
        .route("/revoke", post(passthrough::revoke))
}

/// Mounts one copy of the OAuth routes per configured API category under
/// `{well_known_base_path}{api_category}`
pub(crate) fn router(state: &AppState) -> Router<AppState> {
    let base = state.config.well_known_base_path.trim_end_matches('/');
    state
        .routes
        .iter()
        .fold(Router::new(), |router, route: &RouteContext| {
            let prefix = format!("{}{}", base, route.api_category);
            let category = category_router().layer(Extension(route.clone()));
            if prefix.is_empty() {
                router.merge(category)
            } else {
                router.nest(&prefix, category)
            }
        })
}
