use crate::errors::OAuthError;
use crate::upstream::ClientAuth;
use base64::{engine::general_purpose::STANDARD, Engine};
use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Credentials from an `Authorization: Basic` header, if one parses
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    if client_id.is_empty() {
        return None;
    }
    Some((client_id.to_string(), client_secret.to_string()))
}

fn take_param(params: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let position = params
        .iter()
        .position(|(key, value)| key == name && !value.is_empty())?;
    Some(params.remove(position).1)
}

/// Resolves how the client authenticated, in order: HTTP Basic, body
/// `client_id` + `client_secret`, then body `client_id` alone when public
/// clients are allowed. Body credentials are removed from `params`.
pub(crate) fn authenticate(
    headers: &HeaderMap,
    params: &mut Vec<(String, String)>,
    allow_public_clients: bool,
) -> Result<ClientAuth, OAuthError> {
    if let Some((client_id, client_secret)) = basic_credentials(headers) {
        return Ok(ClientAuth::Basic {
            client_id,
            client_secret,
        });
    }

    let has_secret = params
        .iter()
        .any(|(key, value)| key == "client_secret" && !value.is_empty());
    let has_client_id = params
        .iter()
        .any(|(key, value)| key == "client_id" && !value.is_empty());

    if has_client_id && has_secret {
        if let (Some(client_id), Some(client_secret)) = (
            take_param(params, "client_id"),
            take_param(params, "client_secret"),
        ) {
            return Ok(ClientAuth::Basic {
                client_id,
                client_secret,
            });
        }
    }

    if allow_public_clients && has_client_id {
        if let Some(client_id) = take_param(params, "client_id") {
            return Ok(ClientAuth::None { client_id });
        }
    }

    Err(OAuthError::invalid_client("Client authentication failed"))
}
