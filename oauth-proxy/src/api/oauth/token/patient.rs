use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

pub(crate) const LAUNCH_PATIENT_SCOPE: &str = "launch/patient";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scopes {
    List(Vec<String>),
    Spaced(String),
}

/// Claims read from an issued access token.
///
/// The token was signed by the upstream and is only decoded here, never
/// verified.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AccessTokenClaims {
    #[serde(default)]
    scp: Option<Scopes>,
    #[serde(default)]
    pub aud: Option<Value>,
}

impl AccessTokenClaims {
    /// Decodes the payload segment of a JWT. Opaque tokens yield no claims.
    pub fn decode(token: &str) -> Self {
        let claims = token
            .split('.')
            .nth(1)
            .and_then(|payload| URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok())
            .and_then(|payload| serde_json::from_slice::<AccessTokenClaims>(&payload).ok());
        claims.unwrap_or_else(|| {
            warn!("Issued access token is not a decodable JWT");
            Self::default()
        })
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        match &self.scp {
            Some(Scopes::List(scopes)) => scopes.iter().any(|s| s == scope),
            Some(Scopes::Spaced(scopes)) => scopes.split_whitespace().any(|s| s == scope),
            None => false,
        }
    }
}

/// Patient identifier carried by a launch value.
///
/// A base64 JSON launch contributes its `patient` field; any other value is
/// taken as the identifier itself.
pub(crate) fn patient_from_launch(launch: &str) -> Option<String> {
    let launch = launch.trim();
    if launch.is_empty() {
        return None;
    }
    let context = STANDARD
        .decode(launch)
        .ok()
        .and_then(|decoded| serde_json::from_slice::<Value>(&decoded).ok())
        .filter(Value::is_object);
    match context {
        Some(context) => context
            .get("patient")
            .and_then(Value::as_str)
            .filter(|patient| !patient.is_empty())
            .map(str::to_string),
        None => Some(launch.to_string()),
    }
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: &Value) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}
