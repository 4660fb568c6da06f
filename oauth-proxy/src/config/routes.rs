use serde::Deserialize;

/// Where an API category looks up its registered clients
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClientStore {
    /// The upstream provider's application API
    #[default]
    Upstream,
    /// The local clients table
    Local,
}

/// An isolated API category mounted under its own path prefix
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RouteCategory {
    /// Path suffix appended to the base path, e.g. `/health/v1`
    pub api_category: String,
    /// Issuer URL for this category's authorization server
    pub upstream_issuer: String,
    /// Route-level default identity provider slug
    #[serde(default)]
    pub idp: Option<String>,
    #[serde(default)]
    pub client_store: ClientStore,
}

/// Rewrite entry mapping a public slug to the provider's idp id
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IdpSlug {
    pub slug: String,
    pub id: String,
}

/// Resolves an idp slug, taking the first non-empty candidate
pub fn rewrite_idp(idps: &[IdpSlug], candidates: &[Option<&str>]) -> Option<String> {
    let slug = candidates
        .iter()
        .flatten()
        .find(|slug| !slug.is_empty())?;
    Some(
        idps.iter()
            .find(|entry| entry.slug == *slug)
            .map(|entry| entry.id.clone())
            .unwrap_or_else(|| slug.to_string()),
    )
}
