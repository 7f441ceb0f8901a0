//! Error types for the fetch module.
//!
//! Every failed fetch ends in one of these variants; callers decide whether
//! the failure is worth another identity or a longer wait.

use thiserror::Error;

/// Errors that can end a fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS, timeout).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response that was not classified as a challenge.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// Anti-automation response (CAPTCHA, JS-required page, block status).
    #[error("challenge detected fetching {url} (HTTP {status})")]
    Challenge {
        /// The URL that served the challenge.
        url: String,
        /// Status the challenge was served with.
        status: u16,
        /// Sanitized body excerpt for diagnostics (at most 1000 characters).
        snippet: String,
    },

    /// The response body could not be read.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// The URL whose body failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a challenge error.
    pub fn challenge(url: impl Into<String>, status: u16, snippet: impl Into<String>) -> Self {
        Self::Challenge {
            url: url.into(),
            status,
            snippet: snippet.into(),
        }
    }

    /// Creates a body read error.
    pub fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true for challenge responses.
    #[must_use]
    pub fn is_challenge(&self) -> bool {
        matches!(self, Self::Challenge { .. })
    }

    /// Returns the HTTP status when the error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::Challenge { status, .. } => Some(*status),
            _ => None,
        }
    }
}
