use crate::api::health::{__path_health_check, __path_ready_check};
use crate::api::oauth::authorize::__path_authorize;
use crate::api::oauth::claims::__path_claims;
use crate::api::oauth::launch::__path_launch;
use crate::api::oauth::manage::__path_manage;
use crate::api::oauth::metadata::__path_openid_configuration;
use crate::api::oauth::redirect::__path_redirect;
use crate::api::oauth::token::__path_token;
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth API";

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        ready_check,
        openid_configuration,
        authorize,
        redirect,
        token,
        claims,
        launch,
        manage,
    ),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "OAuth2 and OpenID Connect endpoints"),
    ),
    info(
        title = "OAuth Proxy API",
        description = "OAuth2/OIDC mediation proxy in front of an upstream identity provider",
        version = "1.0.0"
    )
)]
pub(crate) struct ApiDoc;
