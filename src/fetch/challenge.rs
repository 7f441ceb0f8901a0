//! Anti-bot challenge detection.
//!
//! A challenge is a block that needs a different identity rather than just
//! another try: CAPTCHA pages, "enable JavaScript" interstitials and the
//! 403/429 statuses such walls are served with. Challenge pages are sometimes
//! returned with 200, so the body is always inspected.

/// Statuses that are treated as challenges regardless of body.
pub const CHALLENGE_STATUSES: [u16; 2] = [403, 429];

/// Case-insensitive body markers of a challenge page.
pub const CHALLENGE_MARKERS: [&str; 5] = [
    "please enable javascript",
    "cf-chl-bypass",
    "captcha",
    "attention required",
    "cf-browser-verification",
];

/// Maximum length of a diagnostic body snippet, in characters.
pub const MAX_SNIPPET_CHARS: usize = 1000;

/// Returns true if the response looks like an anti-bot challenge.
#[must_use]
pub fn is_challenge(status: u16, body: &str) -> bool {
    if CHALLENGE_STATUSES.contains(&status) {
        return true;
    }
    let lower = body.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Builds a bounded single-line body excerpt for logs.
#[must_use]
pub fn body_snippet(body: &str) -> String {
    body.chars()
        .take(MAX_SNIPPET_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_statuses_are_challenges() {
        assert!(is_challenge(403, ""));
        assert!(is_challenge(429, "ok"));
    }

    #[test]
    fn test_markers_detected_on_200() {
        assert!(is_challenge(200, "<title>Attention Required! | Cloudflare</title>"));
        assert!(is_challenge(200, "Please enable JavaScript and cookies to continue"));
        assert!(is_challenge(200, "<form id=\"challenge-form\" action=\"/?__cf_chl_f_tk=x\"><input name=\"cf-chl-bypass\">"));
        assert!(is_challenge(200, "solve the CAPTCHA"));
    }

    #[test]
    fn test_markers_detected_on_other_statuses() {
        assert!(is_challenge(503, "<div id=\"cf-browser-verification\">"));
    }

    #[test]
    fn test_plain_pages_are_not_challenges() {
        assert!(!is_challenge(200, "<html><body>New releases</body></html>"));
        assert!(!is_challenge(404, "not found"));
        assert!(!is_challenge(500, "internal error"));
    }

    #[test]
    fn test_snippet_is_bounded_and_single_line() {
        let body = format!("line one\nline two\r\n{}", "x".repeat(5000));
        let snippet = body_snippet(&body);
        assert_eq!(snippet.chars().count(), MAX_SNIPPET_CHARS);
        assert!(!snippet.contains('\n'));
        assert!(!snippet.contains('\r'));
        assert!(snippet.starts_with("line one line two"));
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let body = "é".repeat(1500);
        let snippet = body_snippet(&body);
        assert_eq!(snippet.chars().count(), MAX_SNIPPET_CHARS);
    }
}
