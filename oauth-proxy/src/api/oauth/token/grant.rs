use super::patient::{patient_from_launch, AccessTokenClaims, LAUNCH_PATIENT_SCOPE};
use crate::errors::OAuthError;
use crate::state::{AppState, RouteContext};
use crate::store::records::{
    CorrelationRecord, LaunchContextRecord, StaticTokenRecord, CODE_INDEX, REFRESH_TOKEN_INDEX,
};
use crate::upstream::{token, ClientAuth, TokenSet, UpstreamError};
use chrono::Utc;
use http::StatusCode;
use log::{error, info, warn};
use uuid::Uuid;

pub(crate) const JWT_BEARER_ASSERTION: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const UNSUPPORTED_GRANT: &str =
    "Only authorization_code, refresh_token, and client_credentials grant types are supported";
const NO_PATIENT: &str =
    "Could not find a valid patient identifier for the provided authorization code.";

/// Per-request inputs shared by every grant operation
pub(crate) struct TokenContext<'a> {
    pub state: &'a AppState,
    pub route: &'a RouteContext,
    /// `None` for grants that authenticate with an assertion
    pub client: Option<ClientAuth>,
    /// Form body with any client credentials removed
    pub params: Vec<(String, String)>,
}

impl TokenContext<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    fn client(&self) -> Result<&ClientAuth, OAuthError> {
        self.client
            .as_ref()
            .ok_or_else(|| OAuthError::invalid_client("Client authentication failed"))
    }
}

/// Stored state found for a token request
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PulledDocument {
    /// The correlation record matching the code or refresh token
    Correlation(CorrelationRecord),
    /// Launch context supplied with a client credentials request
    Launch(String),
    /// Operator-provisioned tokens matching the refresh token
    StaticTokens(StaticTokenRecord),
}

/// Token issuance strategy selected by `grant_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    Unsupported,
}

impl Grant {
    pub fn from_grant_type(grant_type: Option<&str>) -> Self {
        match grant_type {
            Some("authorization_code") => Self::AuthorizationCode,
            Some("refresh_token") => Self::RefreshToken,
            Some("client_credentials") => Self::ClientCredentials,
            _ => Self::Unsupported,
        }
    }

    pub fn unsupported_error() -> OAuthError {
        OAuthError::unsupported_grant_type(UNSUPPORTED_GRANT)
    }

    /// Whether the client authenticates with `client_id`/secret rather than
    /// an assertion carried in the body
    pub fn authenticates_client(self) -> bool {
        matches!(self, Self::AuthorizationCode | Self::RefreshToken)
    }

    /// Finds the stored state this request continues. Store failures are
    /// logged and read as not found.
    pub async fn pull_document(
        self,
        ctx: &TokenContext<'_>,
    ) -> Result<Option<PulledDocument>, OAuthError> {
        match self {
            Self::AuthorizationCode => {
                let code = ctx
                    .param("code")
                    .ok_or_else(|| OAuthError::invalid_request("Missing parameter: code"))?;
                match find_correlation(ctx, CODE_INDEX, code).await {
                    Some(record) => Ok(Some(PulledDocument::Correlation(record))),
                    None => Err(OAuthError::invalid_grant(
                        StatusCode::BAD_REQUEST,
                        "The authorization code is invalid or has expired.",
                    )),
                }
            }
            Self::RefreshToken => {
                let refresh_token = ctx.param("refresh_token").ok_or_else(|| {
                    OAuthError::invalid_request("Missing parameter: refresh_token")
                })?;
                if let Some(record) = find_correlation(ctx, REFRESH_TOKEN_INDEX, refresh_token).await
                {
                    return Ok(Some(PulledDocument::Correlation(record)));
                }
                if let Some(record) = find_static_tokens(ctx, refresh_token).await {
                    return Ok(Some(PulledDocument::StaticTokens(record)));
                }
                Err(OAuthError::invalid_grant(
                    StatusCode::BAD_REQUEST,
                    "The refresh token is invalid or has expired.",
                ))
            }
            Self::ClientCredentials => Ok(ctx
                .param("launch")
                .map(|launch| PulledDocument::Launch(launch.to_string()))),
            Self::Unsupported => Err(Self::unsupported_error()),
        }
    }

    /// Obtains a token set from the upstream provider
    pub async fn acquire_tokens(self, ctx: &TokenContext<'_>) -> Result<TokenSet, OAuthError> {
        let state = ctx.state;
        let token_endpoint = &ctx.route.issuer.token_endpoint;
        match self {
            Self::AuthorizationCode => {
                let mut form: Vec<(String, String)> = ctx
                    .params
                    .iter()
                    .filter(|(key, _)| key != "redirect_uri")
                    .cloned()
                    .collect();
                form.push(("redirect_uri".to_string(), state.config.redirect_uri()));
                token::request_tokens(&state.http, token_endpoint, ctx.client()?, form)
                    .await
                    .map_err(|err| upstream_failure("Failed to exchange the authorization code", err))
            }
            Self::RefreshToken => {
                let refresh_token = ctx.param("refresh_token").unwrap_or_default();
                let form = vec![
                    ("grant_type".to_string(), "refresh_token".to_string()),
                    ("refresh_token".to_string(), refresh_token.to_string()),
                ];
                token::request_tokens(&state.http, token_endpoint, ctx.client()?, form)
                    .await
                    .map_err(|err| {
                        upstream_failure(
                            "Could not refresh the client session with the provided refresh token",
                            err,
                        )
                    })
            }
            Self::ClientCredentials => {
                if ctx.param("client_assertion_type") != Some(JWT_BEARER_ASSERTION) {
                    return Err(OAuthError::invalid_request(
                        "Client assertion type must be jwt-bearer.",
                    ));
                }
                token::request_tokens_with_assertion(&state.http, token_endpoint, &ctx.params)
                    .await
                    .map_err(client_credentials_failure)
            }
            Self::Unsupported => Err(Self::unsupported_error()),
        }
    }

    /// Persists the outcome of a successful exchange. Returns the client
    /// `state` to echo, if the document carried one.
    pub async fn save_document(
        self,
        ctx: &TokenContext<'_>,
        document: &PulledDocument,
        tokens: &TokenSet,
    ) -> Result<Option<String>, OAuthError> {
        match document {
            PulledDocument::Correlation(record) => {
                let launch = ctx
                    .param("launch")
                    .map(str::to_string)
                    .or_else(|| record.launch.clone());
                rotate(ctx, record, tokens, launch.clone()).await;
                if let Some(launch) = launch {
                    save_launch_context(ctx, &tokens.access_token, launch).await?;
                }
                Ok(Some(record.state.clone()))
            }
            PulledDocument::Launch(launch) => {
                save_launch_context(ctx, &tokens.access_token, launch.clone()).await?;
                Ok(None)
            }
            PulledDocument::StaticTokens(_) => Ok(None),
        }
    }

    /// Resolves the patient for a `launch/patient` token
    pub async fn resolve_patient(
        self,
        ctx: &TokenContext<'_>,
        tokens: &TokenSet,
        claims: &AccessTokenClaims,
    ) -> Result<String, OAuthError> {
        let patient = match self {
            Self::AuthorizationCode | Self::RefreshToken => match ctx
                .state
                .validator
                .patient_icn(&tokens.access_token, claims.aud.as_ref())
                .await
            {
                Ok(icn) => icn,
                Err(err) => {
                    error!("Token validation failed: {}", err);
                    None
                }
            },
            Self::ClientCredentials => ctx.param("launch").and_then(patient_from_launch),
            Self::Unsupported => None,
        };

        patient.ok_or_else(|| {
            error!("Invalid grant, {}", NO_PATIENT);
            OAuthError::invalid_grant(StatusCode::SERVICE_UNAVAILABLE, NO_PATIENT)
        })
    }
}

/// Patient for a static token set, required when it grants `launch/patient`
pub(crate) fn static_patient(record: &StaticTokenRecord) -> Result<Option<String>, OAuthError> {
    let grants_patient = record
        .static_scopes
        .split_whitespace()
        .any(|scope| scope == LAUNCH_PATIENT_SCOPE);
    if !grants_patient {
        return Ok(None);
    }
    match record.static_icn.as_deref().filter(|icn| !icn.is_empty()) {
        Some(icn) => Ok(Some(icn.to_string())),
        None => {
            error!("Static token grants launch/patient without an ICN");
            Err(OAuthError::invalid_grant(
                StatusCode::SERVICE_UNAVAILABLE,
                NO_PATIENT,
            ))
        }
    }
}

async fn find_correlation(
    ctx: &TokenContext<'_>,
    index: &str,
    secret: &str,
) -> Option<CorrelationRecord> {
    match ctx.state.store.query_secret(index, secret).await {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to retrieve document from the store: {}", err);
            None
        }
    }
}

async fn find_static_tokens(
    ctx: &TokenContext<'_>,
    refresh_token: &str,
) -> Option<StaticTokenRecord> {
    if !ctx.state.config.enable_static_token_service {
        return None;
    }
    match ctx.state.store.get::<StaticTokenRecord>(refresh_token).await {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to retrieve static tokens: {}", err);
            None
        }
    }
}

/// Replaces the correlation record with one keyed by a fresh internal state
/// and holding only hashes of the new tokens.
///
/// Not conditional: two concurrent refreshes of the same record both succeed.
async fn rotate(
    ctx: &TokenContext<'_>,
    record: &CorrelationRecord,
    tokens: &TokenSet,
    launch: Option<String>,
) {
    let store = &ctx.state.store;
    let rotated = CorrelationRecord {
        internal_state: Uuid::new_v4().to_string(),
        state: record.state.clone(),
        redirect_uri: record.redirect_uri.clone(),
        code: None,
        access_token_hash: Some(store.hash(&tokens.access_token)),
        refresh_token_hash: tokens
            .refresh_token
            .as_deref()
            .map(|refresh_token| store.hash(refresh_token))
            .or_else(|| record.refresh_token_hash.clone()),
        iss: Some(ctx.route.issuer.issuer.clone()),
        launch,
        expires_on: Utc::now().timestamp() + ctx.state.config.store.session_ttl as i64,
    };

    if let Err(err) = store.put(&rotated).await {
        error!("Could not save the issued tokens: {}", err);
        return;
    }
    if let Err(err) = store.delete::<CorrelationRecord>(&record.internal_state).await {
        warn!(
            "Could not remove superseded request {}: {}",
            record.internal_state, err
        );
    }
    info!(
        "Rotated request {} to {}",
        record.internal_state, rotated.internal_state
    );
}

async fn save_launch_context(
    ctx: &TokenContext<'_>,
    access_token: &str,
    launch: String,
) -> Result<(), OAuthError> {
    let record = LaunchContextRecord {
        access_token_hash: ctx.state.store.hash(access_token),
        launch,
        expires_on: Utc::now().timestamp() + ctx.state.config.store.session_ttl as i64,
    };
    ctx.state.store.put(&record).await.map_err(|err| {
        error!("Could not save the launch context");
        OAuthError::from(err)
    })
}

fn upstream_failure(message: &str, err: UpstreamError) -> OAuthError {
    error!("{}: {}", message, err);
    OAuthError::from(err)
}

/// Only the upstream's 400 and 401 answers reach the client as-is
fn client_credentials_failure(err: UpstreamError) -> OAuthError {
    error!("Client credentials request failed: {}", err);
    match err.status() {
        Some(StatusCode::BAD_REQUEST) | Some(StatusCode::UNAUTHORIZED) => OAuthError::from(err),
        _ => OAuthError::server_error("An unexpected error occurred while requesting tokens."),
    }
}
