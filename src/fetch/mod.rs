//! Polite, challenge-aware HTTP fetching.
//!
//! This module provides:
//! - [`HttpClient`] - pooled reqwest client with browser-like headers
//! - [`PolitenessGate`] - robots.txt allow/deny and crawl delay per origin
//! - [`RateLimiter`] - per-origin spacing of requests
//! - [`ChallengeAwareFetcher`] - retrying GET with anti-bot detection and
//!   identity fallback

mod challenge;
mod client;
mod error;
mod fetcher;
mod rate_limiter;
mod retry;
mod robots;

pub use challenge::{CHALLENGE_MARKERS, CHALLENGE_STATUSES, MAX_SNIPPET_CHARS, body_snippet, is_challenge};
pub use client::{CONNECT_TIMEOUT_SECS, HttpClient, READ_TIMEOUT_SECS, browser_headers};
pub use error::FetchError;
pub use fetcher::{AttemptOutcome, ChallengeAwareFetcher, IdentityPair, RequestSpec};
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use robots::{
    DEFAULT_DELAY_FLOOR, PolitenessGate, PolitenessPolicy, RobotsError, RobotsRules,
    origin_for_robots,
};
