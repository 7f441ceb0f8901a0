//! Identity strings presented to listing sites and to MusicBrainz.
//!
//! Listing sites get a browser identity (overridable through
//! `RELEASE_AGG_USER_AGENT`) with a second browser identity as fallback.
//! MusicBrainz asks API clients to identify the application and a contact URL.

/// Environment variable that replaces the primary browser identity.
pub const USER_AGENT_ENV: &str = "RELEASE_AGG_USER_AGENT";

/// Project URL for API identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/release-aggregator";

/// Primary browser identity for HTML/JSON listing pages.
pub const DEFAULT_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fallback browser identity, tried once after a challenge.
pub const FALLBACK_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15";

/// Application identity for the MusicBrainz web service.
#[must_use]
pub fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("release-aggregator/{version} ( +{PROJECT_UA_URL} )")
}

/// Resolves the primary browser identity from an optional override value.
///
/// Blank overrides are ignored.
#[must_use]
pub fn resolve_browser_user_agent(override_value: Option<&str>) -> String {
    override_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| DEFAULT_BROWSER_USER_AGENT.to_string(), str::to_string)
}

/// Reads the identity override from the environment. Called once at startup.
#[must_use]
pub fn browser_user_agent_from_env() -> String {
    let value = std::env::var(USER_AGENT_ENV).ok();
    resolve_browser_user_agent(value.as_deref())
}
