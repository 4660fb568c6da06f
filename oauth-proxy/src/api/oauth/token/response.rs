use crate::headers::presets;
use crate::store::records::StaticTokenRecord;
use crate::upstream::TokenSet;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful token response. Absent fields are omitted, never null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Lifetime in seconds from issuance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Patient ICN, present whenever `launch/patient` was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    /// The client's original `state`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl TokenResponse {
    pub fn from_token_set(tokens: &TokenSet) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            token_type: tokens.token_type.clone(),
            expires_in: tokens.expires_in_secs(),
            refresh_token: tokens.refresh_token.clone(),
            id_token: tokens.id_token.clone(),
            scope: tokens.scope.clone(),
            patient: None,
            state: None,
        }
    }

    pub fn from_static(record: &StaticTokenRecord) -> Self {
        Self {
            access_token: record.static_access_token.clone(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(record.static_expires_in),
            refresh_token: Some(record.static_refresh_token.clone()),
            id_token: record.static_id_token.clone(),
            scope: Some(record.static_scopes.clone()),
            patient: None,
            state: None,
        }
    }
}

impl IntoResponse for TokenResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self).into_response();
        presets::no_store().apply(&mut response);
        response
    }
}
