//! Per-origin request spacing driven by the politeness policy.
//!
//! Every fetch to a site waits until at least the site's minimum delay has
//! passed since the previous request to that site. The first request to a site
//! waits the full delay too, so the robots.txt read is never immediately
//! followed by a listing request.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use aggregator_core::fetch::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new();
//! limiter.acquire("https://example.com/page/1", Duration::from_millis(10)).await;
//! limiter.acquire("https://example.com/page/2", Duration::from_millis(10)).await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per domain (2 minutes).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(120);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-domain request spacing.
#[derive(Debug, Default)]
pub struct RateLimiter {
    /// Per-domain state. Arc lets the `DashMap` shard lock be released before
    /// awaiting on the inner mutex.
    domains: DashMap<String, Arc<DomainState>>,
}

#[derive(Debug, Default)]
struct DomainState {
    /// `None` until the first request to this domain.
    last_request: Mutex<Option<Instant>>,

    /// Cumulative delay applied to this domain, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl DomainState {
    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a request to `url`'s domain respects `min_delay`, then
    /// records the request time.
    #[instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, url: &str, min_delay: Duration) {
        let domain = extract_domain(url);
        tracing::Span::current().record("domain", domain.as_str());

        let state = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(DomainState::default()))
            .clone();

        let mut last_request_guard = state.last_request.lock().await;

        let delay = match *last_request_guard {
            Some(last_request) => min_delay.saturating_sub(last_request.elapsed()),
            None => min_delay,
        };

        if !delay.is_zero() {
            let cumulative = state.add_cumulative_delay(delay);
            debug!(
                domain = %domain,
                delay_ms = delay.as_millis(),
                cumulative_ms = cumulative.as_millis(),
                "applying politeness delay"
            );
            if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    domain = %domain,
                    cumulative_delay_secs = cumulative.as_secs(),
                    "long cumulative politeness delay for this site"
                );
            }
            tokio::time::sleep(delay).await;
        }

        *last_request_guard = Some(Instant::now());
    }

    /// Returns the cumulative delay applied to a domain.
    #[must_use]
    pub fn cumulative_delay(&self, url: &str) -> Duration {
        let domain = extract_domain(url);
        self.domains.get(&domain).map_or(Duration::ZERO, |state| {
            Duration::from_millis(state.cumulative_delay_ms.load(Ordering::SeqCst))
        })
    }
}

/// Extracts the lowercase host from a URL.
///
/// Returns "unknown" for malformed URLs so they are still spaced.
///
/// ```
/// use aggregator_core::fetch::extract_domain;
///
/// assert_eq!(extract_domain("https://Metalstorm.net/events"), "metalstorm.net");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-dates (RFC 7231). Returns `None` if the
/// value cannot be parsed. Caps excessive values at 1 hour.
///
/// ```
/// use std::time::Duration;
/// use aggregator_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        match datetime.duration_since(now) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, returning zero");
                Some(Duration::ZERO)
            }
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
