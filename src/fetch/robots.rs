//! robots.txt fetching and evaluation for polite crawling.
//!
//! Supports `User-agent` groups, `Allow`/`Disallow` (longest matching prefix
//! wins, ties go to `Allow`) and `Crawl-delay`. Each origin is read once per
//! run. A policy that cannot be read never blocks the run: the gate fails open
//! with the delay floor.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use super::client::{HttpClient, browser_headers};

/// Default minimum delay between requests to one site (3 seconds).
pub const DEFAULT_DELAY_FLOOR: Duration = Duration::from_secs(3);

/// Outcome of checking a path against a site's crawling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessPolicy {
    /// Whether the path may be fetched.
    pub allowed: bool,
    /// Minimum delay to respect before each request to the site.
    pub min_delay: Duration,
}

/// Per-run robots.txt gate with a per-origin cache.
#[derive(Debug)]
pub struct PolitenessGate {
    cache: DashMap<String, Arc<RobotsRules>>,
    identity: String,
    product_token: String,
    delay_floor: Duration,
}

/// Rules of the group that applies to our client.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RobotsRules {
    rules: Vec<PathRule>,
    crawl_delay: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathRule {
    allow: bool,
    prefix: String,
}

impl PolitenessGate {
    /// Creates a gate that identifies as `identity` and never allows a delay
    /// below `delay_floor`.
    #[must_use]
    pub fn new(identity: impl Into<String>, delay_floor: Duration) -> Self {
        let identity = identity.into();
        Self {
            cache: DashMap::new(),
            product_token: product_token(&identity),
            identity,
            delay_floor,
        }
    }

    /// Returns the configured delay floor.
    #[must_use]
    pub fn delay_floor(&self) -> Duration {
        self.delay_floor
    }

    /// Evaluates `path` against the policy published at `site_base_url`.
    ///
    /// Reads `<origin>/robots.txt` on first use of an origin. Read failures are
    /// logged and produce an allow-all policy with the delay floor.
    #[instrument(skip(self, client), fields(site = %site_base_url))]
    pub async fn evaluate(
        &self,
        client: &HttpClient,
        site_base_url: &str,
        path: &str,
    ) -> PolitenessPolicy {
        let Some(origin) = origin_for_robots(site_base_url) else {
            warn!(site = %site_base_url, "cannot derive origin for robots.txt; allowing");
            return self.permissive_policy();
        };

        let cached = self.cache.get(&origin).map(|entry| Arc::clone(entry.value()));
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = match fetch_robots_txt(&origin, &self.identity, client).await {
                    Ok(Some(body)) => {
                        debug!(origin = %origin, "fetched robots.txt");
                        parse_robots(&body, &self.product_token)
                    }
                    Ok(None) => {
                        debug!(origin = %origin, "no robots.txt published");
                        RobotsRules::default()
                    }
                    Err(error) => {
                        warn!(origin = %origin, error = %error, "could not read robots.txt; failing open");
                        RobotsRules::default()
                    }
                };
                let rules = Arc::new(rules);
                self.cache.insert(origin.clone(), Arc::clone(&rules));
                rules
            }
        };

        let allowed = rules.is_allowed(path);
        if !allowed {
            debug!(path = %path, origin = %origin, "robots.txt disallows path");
        }
        PolitenessPolicy {
            allowed,
            min_delay: self.clamp_delay(rules.crawl_delay),
        }
    }

    fn permissive_policy(&self) -> PolitenessPolicy {
        PolitenessPolicy {
            allowed: true,
            min_delay: self.delay_floor,
        }
    }

    fn clamp_delay(&self, declared: Option<Duration>) -> Duration {
        declared.map_or(self.delay_floor, |delay| delay.max(self.delay_floor))
    }
}

impl RobotsRules {
    /// Returns whether `path` may be fetched under these rules.
    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let best = self
            .rules
            .iter()
            .filter(|rule| path.starts_with(rule.prefix.as_str()))
            .max_by(|a, b| {
                a.prefix
                    .len()
                    .cmp(&b.prefix.len())
                    .then_with(|| a.allow.cmp(&b.allow))
            });
        best.is_none_or(|rule| rule.allow)
    }

    /// Returns the declared crawl delay, if any.
    #[must_use]
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

async fn fetch_robots_txt(
    origin: &str,
    identity: &str,
    client: &HttpClient,
) -> Result<Option<String>, RobotsError> {
    let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));
    let response = client
        .inner()
        .get(&robots_url)
        .headers(browser_headers(identity))
        .send()
        .await
        .map_err(RobotsError::Fetch)?;
    let status = response.status();
    if !status.is_success() {
        if status.as_u16() == 404 {
            return Ok(None);
        }
        return Err(RobotsError::Status(robots_url, status.as_u16()));
    }
    let body = response.text().await.map_err(RobotsError::Body)?;
    Ok(Some(body))
}

/// Parses a robots.txt body and keeps the group that applies to `product_token`.
///
/// A group naming our token wins over the `*` group.
fn parse_robots(body: &str, product_token: &str) -> RobotsRules {
    let mut groups: Vec<(Vec<String>, RobotsRules)> = Vec::new();
    let mut collecting_agents = false;

    for raw_line in body.lines() {
        let line = raw_line.split('#').next().unwrap_or_default().trim();
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_ascii_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if !collecting_agents || groups.is_empty() {
                    groups.push((Vec::new(), RobotsRules::default()));
                }
                collecting_agents = true;
                if let Some((agents, _)) = groups.last_mut() {
                    agents.push(value.to_ascii_lowercase());
                }
            }
            "allow" | "disallow" => {
                collecting_agents = false;
                let Some((_, rules)) = groups.last_mut() else {
                    continue;
                };
                let prefix = normalize_rule_path(value);
                if prefix.is_empty() {
                    continue;
                }
                let rule = PathRule {
                    allow: field == "allow",
                    prefix,
                };
                if !rules.rules.contains(&rule) {
                    rules.rules.push(rule);
                }
            }
            "crawl-delay" => {
                collecting_agents = false;
                if let Some((_, rules)) = groups.last_mut() {
                    rules.crawl_delay = parse_crawl_delay(value);
                }
            }
            _ => {}
        }
    }

    // A group applies when its agent names exactly our product token.
    let specific = groups.iter().position(|(agents, _)| {
        agents
            .iter()
            .any(|agent| agent != "*" && self::product_token(agent) == product_token)
    });
    let wildcard = groups
        .iter()
        .position(|(agents, _)| agents.iter().any(|agent| agent == "*"));

    specific
        .or(wildcard)
        .map(|index| groups.swap_remove(index).1)
        .unwrap_or_default()
}

fn normalize_rule_path(path: &str) -> String {
    let s = path.trim().trim_end_matches('*');
    if s.is_empty() {
        return String::new();
    }
    let mut s = s.to_string();
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    s
}

/// Parses `Crawl-delay`, rounding fractional seconds up.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_crawl_delay(value: &str) -> Option<Duration> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(seconds.ceil() as u64))
}

/// Lowercased product token of an identity string (`Mozilla/5.0 ...` -> `mozilla`).
fn product_token(identity: &str) -> String {
    identity
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Errors from robots.txt reading. Never propagated past the gate.
#[derive(Debug, thiserror::Error)]
pub enum RobotsError {
    #[error("failed to fetch robots.txt: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("robots.txt returned status {1} for {0}")]
    Status(String, u16),
    #[error("failed to read robots.txt body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Builds the origin string (scheme + host + port) from a URL.
#[must_use]
pub fn origin_for_robots(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let scheme = parsed.scheme();
    let host = parsed.host_str()?;
    let origin = if let Some(port) = parsed.port() {
        format!("{scheme}://{host}:{port}")
    } else {
        format!("{scheme}://{host}")
    };
    Some(origin)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_allows_everything() {
        let rules = parse_robots("", "mozilla");
        assert!(rules.is_allowed("/anything"));
        assert_eq!(rules.crawl_delay(), None);
    }

    #[test]
    fn test_parse_star_disallow() {
        let rules = parse_robots("User-agent: *\nDisallow: /api/\nDisallow: /private/\n", "mozilla");
        assert!(!rules.is_allowed("/api/v1"));
        assert!(!rules.is_allowed("/private/x"));
        assert!(rules.is_allowed("/events/new_releases.php"));
    }

    #[test]
    fn test_empty_disallow_allows_all() {
        let rules = parse_robots("User-agent: *\nDisallow: \n", "mozilla");
        assert!(rules.is_allowed("/"));
    }

    #[test]
    fn test_longest_match_wins_and_allow_breaks_ties() {
        let body = "User-agent: *\nDisallow: /release/\nAllow: /release/ajax-upcoming/\n";
        let rules = parse_robots(body, "mozilla");
        assert!(rules.is_allowed("/release/ajax-upcoming/json/1"));
        assert!(!rules.is_allowed("/release/view/1"));

        let tie = parse_robots("User-agent: *\nDisallow: /a\nAllow: /a\n", "mozilla");
        assert!(tie.is_allowed("/a/b"));
    }

    #[test]
    fn test_specific_group_beats_wildcard() {
        let body = "User-agent: *\nDisallow: /\n\nUser-agent: release-aggregator\nDisallow: /private/\nCrawl-delay: 5\n";
        let rules = parse_robots(body, "release-aggregator");
        assert!(rules.is_allowed("/events/"));
        assert!(!rules.is_allowed("/private/x"));
        assert_eq!(rules.crawl_delay(), Some(Duration::from_secs(5)));

        let browser = parse_robots(body, "mozilla");
        assert!(!browser.is_allowed("/events/"));
    }

    #[test]
    fn test_partial_agent_name_does_not_select_group() {
        let body = "User-agent: a\nDisallow: /\n\nUser-agent: moz\nDisallow: /\n\nUser-agent: *\nDisallow: /admin/\n";
        let rules = parse_robots(body, "mozilla");
        assert!(rules.is_allowed("/events/"));
        assert!(!rules.is_allowed("/admin/x"));

        let versioned = parse_robots("User-agent: Mozilla/5.0\nDisallow: /x/\n", "mozilla");
        assert!(!versioned.is_allowed("/x/1"));
    }

    #[test]
    fn test_multiple_agents_share_group() {
        let body = "User-agent: googlebot\nUser-agent: *\nDisallow: /search\n";
        let rules = parse_robots(body, "mozilla");
        assert!(!rules.is_allowed("/search?q=x"));
    }

    #[test]
    fn test_comments_and_case_are_tolerated() {
        let body = "# hello\nUSER-AGENT: * # everyone\nDISALLOW: /secret/ # hidden\ncrawl-delay: 10\n";
        let rules = parse_robots(body, "mozilla");
        assert!(!rules.is_allowed("/secret/a"));
        assert_eq!(rules.crawl_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_fractional_crawl_delay_rounds_up() {
        assert_eq!(parse_crawl_delay("1.5"), Some(Duration::from_secs(2)));
        assert_eq!(parse_crawl_delay("abc"), None);
        assert_eq!(parse_crawl_delay("-1"), None);
    }

    #[test]
    fn test_normalize_rule_path() {
        assert_eq!(normalize_rule_path("/foo"), "/foo");
        assert_eq!(normalize_rule_path("foo"), "/foo");
        assert_eq!(normalize_rule_path("/foo*"), "/foo");
        assert_eq!(normalize_rule_path("   "), "");
    }

    #[test]
    fn test_product_token() {
        assert_eq!(product_token("Mozilla/5.0 (X11)"), "mozilla");
        assert_eq!(product_token("release-aggregator/0.1.0 (+x)"), "release-aggregator");
    }

    #[test]
    fn test_delay_is_floored() {
        let gate = PolitenessGate::new("Mozilla/5.0", DEFAULT_DELAY_FLOOR);
        assert_eq!(gate.clamp_delay(None), Duration::from_secs(3));
        assert_eq!(gate.clamp_delay(Some(Duration::from_secs(1))), Duration::from_secs(3));
        assert_eq!(gate.clamp_delay(Some(Duration::from_secs(10))), Duration::from_secs(10));
    }

    #[test]
    fn test_origin_for_robots() {
        assert_eq!(
            origin_for_robots("https://example.com/path?query=1#frag"),
            Some("https://example.com".to_string())
        );
        assert_eq!(
            origin_for_robots("http://localhost:8080/file"),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(origin_for_robots("not_a_valid_url"), None);
    }
}
