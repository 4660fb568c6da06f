//! Record shapes persisted in the document store.
//!
//! Every field named `*_hash` (and `code`) holds the HMAC of the secret, never
//! the secret itself. Records written before hashing was introduced hold the
//! raw value in the same field and are only reachable through
//! [`DocumentStore::query_secret`](super::DocumentStore::query_secret).

use super::{Document, Table};
use serde::{Deserialize, Serialize};

pub const STATE_INDEX: &str = "oauth_state_index";
pub const CODE_INDEX: &str = "oauth_code_index";
pub const ACCESS_TOKEN_INDEX: &str = "oauth_access_token_index";
pub const REFRESH_TOKEN_INDEX: &str = "oauth_refresh_token_index";

/// Correlates one authorize → redirect → token sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationRecord {
    pub internal_state: String,
    pub state: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<String>,
    pub expires_on: i64,
}

impl CorrelationRecord {
    pub fn new(internal_state: String, state: String, redirect_uri: String, expires_on: i64) -> Self {
        Self {
            internal_state,
            state,
            redirect_uri,
            code: None,
            access_token_hash: None,
            refresh_token_hash: None,
            iss: None,
            launch: None,
            expires_on,
        }
    }

    /// True once tokens have been issued against this record
    pub fn holds_tokens(&self) -> bool {
        self.access_token_hash.is_some() || self.refresh_token_hash.is_some()
    }
}

impl Document for CorrelationRecord {
    const TABLE: Table = Table::OAuthRequests;

    fn primary_key(&self) -> &str {
        &self.internal_state
    }

    fn index_values(&self) -> Vec<(&'static str, &str)> {
        let mut values = Vec::new();
        // Token-bearing records are reachable by token only, never by the
        // client-visible state
        if !self.holds_tokens() {
            values.push((STATE_INDEX, self.state.as_str()));
        }
        if let Some(code) = &self.code {
            values.push((CODE_INDEX, code));
        }
        if let Some(access_token) = &self.access_token_hash {
            values.push((ACCESS_TOKEN_INDEX, access_token));
        }
        if let Some(refresh_token) = &self.refresh_token_hash {
            values.push((REFRESH_TOKEN_INDEX, refresh_token));
        }
        values
    }

    fn expires_on(&self) -> Option<i64> {
        Some(self.expires_on)
    }
}

/// SMART launch context bound to an issued access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchContextRecord {
    pub access_token_hash: String,
    pub launch: String,
    pub expires_on: i64,
}

impl Document for LaunchContextRecord {
    const TABLE: Table = Table::LaunchContext;

    fn primary_key(&self) -> &str {
        &self.access_token_hash
    }

    fn expires_on(&self) -> Option<i64> {
        Some(self.expires_on)
    }
}

/// Operator-provisioned token set served in place of the upstream provider.
///
/// Keyed by the raw refresh token, unlike every other secret in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticTokenRecord {
    pub static_refresh_token: String,
    pub static_access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_icn: Option<String>,
    pub static_scopes: String,
    pub static_expires_in: u64,
}

impl Document for StaticTokenRecord {
    const TABLE: Table = Table::StaticTokens;

    fn primary_key(&self) -> &str {
        &self.static_refresh_token
    }
}

/// Locally registered client, used instead of the provider's application API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
}

impl Document for ClientRecord {
    const TABLE: Table = Table::Clients;

    fn primary_key(&self) -> &str {
        &self.client_id
    }
}
