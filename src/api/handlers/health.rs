//! Health handlers.
//!
//! - `/healthz`: process liveness only, always `200 OK`.
//! - `/ready`: credential store reachability for orchestrators.
//!
//! Neither endpoint goes through the auth rate limiter.

use crate::{api::handlers::auth::AuthState, GIT_COMMIT_HASH};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};

const READY_STORE_TIMEOUT_SECONDS: u64 = 2;

#[utoipa::path(
    get,
    path = "/healthz",
    responses (
        (status = 200, description = "Process is alive", body = String, content_type = "text/plain")
    ),
    tag = "health",
)]
/// Report process liveness without checking external dependencies.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, x_app_headers(), "OK")
}

#[utoipa::path(
    get,
    path = "/ready",
    responses (
        (status = 200, description = "Credential store is reachable"),
        (status = 503, description = "Credential store is not reachable")
    ),
    tag = "health",
)]
/// Report readiness based on credential store connectivity.
pub async fn ready(Extension(state): Extension<Arc<AuthState>>) -> impl IntoResponse {
    let healthy = match timeout(
        Duration::from_secs(READY_STORE_TIMEOUT_SECONDS),
        state.store().ping(),
    )
    .await
    {
        Ok(Ok(())) => {
            debug!("Credential store is healthy");
            true
        }
        Ok(Err(err)) => {
            error!("Credential store ping failed: {err}");
            false
        }
        Err(_) => {
            warn!("Credential store ping timed out");
            false
        }
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, x_app_headers())
}

/// `X-App: <name>:<version>:<short commit>`
fn x_app_headers() -> HeaderMap {
    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    };

    format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )
    .parse::<HeaderValue>()
    .map(|x_app_header_value| {
        let mut headers = HeaderMap::new();
        headers.insert("X-App", x_app_header_value);
        headers
    })
    .map_err(|err| {
        debug!("Failed to parse X-App header: {}", err);
    })
    .unwrap_or_else(|()| HeaderMap::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{
        store::{CredentialStore, LookupFuture, PingFuture, StoreError},
        AuthConfig, MemoryCredentialStore, NoopRateLimiter,
    };
    use anyhow::Result;
    use axum::body::to_bytes;

    struct DownStore;

    impl CredentialStore for DownStore {
        fn lookup<'a>(&'a self, _identity: &'a str) -> LookupFuture<'a> {
            Box::pin(async { Ok(None) })
        }

        fn ping(&self) -> PingFuture<'_> {
            Box::pin(async { Err(StoreError::UnrecognizedSecret) })
        }
    }

    fn state(store: Arc<dyn CredentialStore>) -> Arc<AuthState> {
        Arc::new(AuthState::with_decoy_hash(
            AuthConfig::new(),
            Arc::new(NoopRateLimiter),
            store,
            String::new(),
        ))
    }

    #[tokio::test]
    async fn healthz_returns_ok_body() -> Result<()> {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(env!("CARGO_PKG_NAME"))));

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"OK");
        Ok(())
    }

    #[tokio::test]
    async fn ready_reflects_store_ping() {
        let response = ready(Extension(state(Arc::new(MemoryCredentialStore::new()))))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = ready(Extension(state(Arc::new(DownStore))))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
