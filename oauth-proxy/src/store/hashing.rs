use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Keyed hash applied to codes and tokens before they touch the store
#[derive(Clone)]
pub struct SecretHasher {
    mac: HmacSha256,
}

impl SecretHasher {
    pub fn new(secret: &str) -> Result<Self, StoreError> {
        if secret.is_empty() {
            return Err(StoreError::Config("HMAC secret must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| StoreError::Config(format!("Invalid HMAC secret: {e}")))?;
        Ok(Self { mac })
    }

    /// Hex encoded HMAC-SHA256 of `value`
    pub fn hash(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher").finish_non_exhaustive()
    }
}
