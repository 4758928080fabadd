//! `GET /auth`: HTTP Basic credential verification.
//!
//! Each request runs through the same pipeline:
//!
//! rate limit -> extract credentials -> lookup (with deadline) -> verify -> respond
//!
//! ## Rate Limiting
//!
//! The limiter is consulted before the header is parsed, so malformed and
//! well-formed attempts consume the same budget. It is keyed by client origin,
//! never by identity: one origin cannot spread attempts across many identities
//! to escape the quota, but distributed attempts are not prevented.
//!
//! ## Rejections
//!
//! An unknown identity, a store error, a lookup that outlives its deadline and a
//! wrong secret all map to the same `Rejected` outcome. Which one happened is
//! only logged.

pub mod credentials;
pub mod rate_limit;
pub mod response;
pub mod state;
pub mod store;
mod utils;
pub mod verifier;

pub use rate_limit::{
    FixedWindowRateLimiter, NoopRateLimiter, RateLimitDecision, RateLimitStatus, RateLimiter,
};
pub use response::{AuthAttempt, AuthOutcome};
pub use state::{AuthConfig, AuthState};
pub use store::{
    CredentialStore, HashScheme, MemoryCredentialStore, PgCredentialStore, StoredSecret,
};

use axum::{
    extract::{ConnectInfo, Extension},
    http::HeaderMap,
    response::Response,
};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use verifier::Verification;

#[utoipa::path(
    get,
    path = "/auth",
    responses (
        (status = 200, description = "Credentials are valid", body = String, content_type = "text/plain",
            headers(
                ("X-RateLimit-Limit" = u32, description = "Requests allowed per window"),
                ("X-RateLimit-Remaining" = u32, description = "Requests left in the current window"),
                ("X-RateLimit-Reset" = u64, description = "Unix time at which the window resets"),
            )),
        (status = 401, description = "Missing, malformed or invalid credentials", body = String, content_type = "text/plain",
            headers(("WWW-Authenticate" = String, description = "Basic challenge naming the realm"))),
        (status = 429, description = "Too many attempts from this origin", body = String, content_type = "text/plain",
            headers(("Retry-After" = u64, description = "Seconds until the window resets"))),
    ),
    security(("basic_auth" = [])),
    tag = "auth",
)]
#[instrument(skip_all, fields(origin))]
pub async fn auth(
    Extension(state): Extension<Arc<AuthState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let origin = utils::client_origin(&headers, peer, state.config().client_ip_header());
    tracing::Span::current().record("origin", tracing::field::display(origin));

    authenticate(&state, origin, &headers)
        .await
        .into_response_with_realm(state.config().realm())
}

/// Classify one authentication attempt from `origin`.
pub async fn authenticate(state: &AuthState, origin: IpAddr, headers: &HeaderMap) -> AuthAttempt {
    let decision = state.limiter().check(origin);
    let rate_limit = decision.status();

    let outcome = match decision {
        RateLimitDecision::Limited(status) => {
            debug!("Rate limit exceeded");
            AuthOutcome::RateLimited {
                retry_after: status.reset_after,
            }
        }
        RateLimitDecision::Allowed(_) | RateLimitDecision::Unlimited => {
            verify_credentials(state, headers).await
        }
    };

    AuthAttempt {
        outcome,
        rate_limit,
    }
}

async fn verify_credentials(state: &AuthState, headers: &HeaderMap) -> AuthOutcome {
    let credentials = match credentials::extract(headers) {
        Ok(credentials) => credentials,
        Err(err) => {
            debug!("Malformed credentials: {err}");
            return AuthOutcome::Malformed;
        }
    };

    let stored = match timeout(
        state.config().lookup_timeout(),
        state.store().lookup(credentials.identity()),
    )
    .await
    {
        Ok(Ok(stored)) => {
            if stored.is_none() {
                debug!("Unknown identity");
            }
            stored
        }
        Ok(Err(err)) => {
            error!("Credential lookup failed: {err}");
            None
        }
        Err(_) => {
            warn!(
                "Credential lookup exceeded {}ms deadline",
                state.config().lookup_timeout().as_millis()
            );
            None
        }
    };

    let known = stored.is_some();
    // Misses are verified against the decoy so they cost as much as a mismatch.
    let target = stored.unwrap_or_else(|| {
        StoredSecret::Hashed(HashScheme::Argon2, state.decoy_hash().to_string())
    });
    let (identity, secret) = credentials.into_parts();

    let verification =
        match tokio::task::spawn_blocking(move || verifier::verify(&secret, &target)).await {
            Ok(verification) => verification,
            Err(err) => {
                error!("Verification task failed: {err}");
                Verification::NoMatch
            }
        };

    match (known, verification) {
        (true, Verification::Match) => {
            info!(identity = %identity, "Authenticated");
            AuthOutcome::Authenticated(identity)
        }
        (true, Verification::NoMatch) => {
            debug!("Secret mismatch");
            AuthOutcome::Rejected
        }
        (false, _) => AuthOutcome::Rejected,
    }
}
