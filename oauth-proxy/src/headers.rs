use axum::http::HeaderValue;
use chrono::{DateTime, Utc};
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use log::warn;

/// Cache-Control directives
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    pub no_store: bool,
    pub public: bool,
    pub max_age: Option<u32>,
}

impl CacheControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn to_header_value(&self) -> HeaderValue {
        let mut parts = Vec::new();

        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.public {
            parts.push("public".to_string());
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("max-age={max_age}"));
        }

        HeaderValue::from_str(&parts.join(", ")).unwrap_or(HeaderValue::from_static(""))
    }
}

/// Helper struct for setting cache-related headers
#[derive(Debug, Clone, Default)]
pub struct CacheHeaders {
    cache_control: CacheControl,
    expires: Option<DateTime<Utc>>,
}

impl CacheHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Apply headers to a response
    pub fn apply<B>(&self, response: &mut axum::response::Response<B>) {
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, self.cache_control.to_header_value());

        // Pragma is what HTTP/1.0 caches between the client and us honour
        if self.cache_control.no_store {
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        if let Some(expires) = self.expires {
            match HeaderValue::from_str(&expires.to_rfc2822()) {
                Ok(expires_value) => {
                    headers.insert(EXPIRES, expires_value);
                }
                Err(e) => warn!("failed to set expires header: {e}"),
            }
        }
    }
}

/// Common cache control presets
pub mod presets {
    use super::*;
    use chrono::Duration;

    /// Token responses must never be cached
    pub fn no_store() -> CacheHeaders {
        CacheHeaders::new().cache_control(CacheControl::new().no_store())
    }

    /// Public caching with max age
    pub fn public_cache(max_age_seconds: u32) -> CacheHeaders {
        CacheHeaders::new()
            .cache_control(CacheControl::new().public().max_age(max_age_seconds))
            .expires(Utc::now() + Duration::seconds(i64::from(max_age_seconds)))
    }
}
