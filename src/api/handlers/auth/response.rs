//! Mapping of authentication outcomes to HTTP responses.

use axum::{
    http::{
        header::{CACHE_CONTROL, RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::error;

use super::rate_limit::RateLimitStatus;

pub const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

pub const BODY_UNAUTHORIZED: &str = "Unauthorized";
pub const BODY_INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const BODY_TOO_MANY_REQUESTS: &str = "Too Many Requests";

/// Classification of a single authentication attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(String),
    Malformed,
    /// Unknown identity, failed or timed out lookup, or wrong secret.
    Rejected,
    RateLimited { retry_after: Duration },
}

impl AuthOutcome {
    /// Render the outcome, naming `realm` in the Basic challenge.
    #[must_use]
    pub fn into_response_with_realm(self, realm: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

        match self {
            Self::Authenticated(identity) => {
                (StatusCode::OK, headers, format!("Authenticated as {identity}")).into_response()
            }
            Self::Malformed => {
                headers.insert(WWW_AUTHENTICATE, challenge(realm));
                (StatusCode::UNAUTHORIZED, headers, BODY_UNAUTHORIZED).into_response()
            }
            Self::Rejected => {
                headers.insert(WWW_AUTHENTICATE, challenge(realm));
                (StatusCode::UNAUTHORIZED, headers, BODY_INVALID_CREDENTIALS).into_response()
            }
            Self::RateLimited { retry_after } => {
                headers.insert(RETRY_AFTER, retry_after_seconds(retry_after));
                (StatusCode::TOO_MANY_REQUESTS, headers, BODY_TOO_MANY_REQUESTS).into_response()
            }
        }
    }
}

/// An outcome together with the origin's rate-limit budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthAttempt {
    pub outcome: AuthOutcome,
    /// `None` when rate limiting is disabled.
    pub rate_limit: Option<RateLimitStatus>,
}

impl AuthAttempt {
    /// Render the outcome and, when limiting is on, the `X-RateLimit-*` headers.
    #[must_use]
    pub fn into_response_with_realm(self, realm: &str) -> Response {
        let mut response = self.outcome.into_response_with_realm(realm);
        if let Some(status) = self.rate_limit {
            insert_rate_limit_headers(response.headers_mut(), &status, SystemTime::now());
        }
        response
    }
}

/// `X-RateLimit-Reset` is the end of the window as unix seconds, rounded up.
fn insert_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus, now: SystemTime) {
    let reset_at = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .saturating_add(status.reset_after);
    let mut reset_secs = reset_at.as_secs();
    if reset_at.subsec_nanos() > 0 {
        reset_secs = reset_secs.saturating_add(1);
    }

    headers.insert(HEADER_RATE_LIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(HEADER_RATE_LIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(HEADER_RATE_LIMIT_RESET, HeaderValue::from(reset_secs));
}

/// `Basic realm="<realm>"`, falling back to the default realm if the configured
/// one cannot be carried in a header.
fn challenge(realm: &str) -> HeaderValue {
    let escaped = realm.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_str(&format!("Basic realm=\"{escaped}\"")).unwrap_or_else(|err| {
        error!("Invalid realm for WWW-Authenticate header: {err}");
        HeaderValue::from_static("Basic realm=\"Restricted\"")
    })
}

fn retry_after_seconds(retry_after: Duration) -> HeaderValue {
    // Round up so clients never retry inside the current window.
    let mut seconds = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        seconds = seconds.saturating_add(1);
    }
    HeaderValue::from(seconds.max(1))
}
