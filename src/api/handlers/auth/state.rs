//! Auth state and configuration.

use axum::http::HeaderName;
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use std::time::Duration;

use super::{
    rate_limit::RateLimiter,
    store::CredentialStore,
    verifier::{self, HashError},
};

pub const DEFAULT_REALM: &str = "Restricted";
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    realm: String,
    lookup_timeout: Duration,
    client_ip_header: Option<HeaderName>,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            client_ip_header: None,
        }
    }

    #[must_use]
    pub fn with_realm(mut self, realm: String) -> Self {
        self.realm = realm;
        self
    }

    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Trust `header` (first hop) as the client origin when present.
    #[must_use]
    pub fn with_client_ip_header(mut self, header: Option<HeaderName>) -> Self {
        self.client_ip_header = header;
        self
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    #[must_use]
    pub fn client_ip_header(&self) -> Option<&HeaderName> {
        self.client_ip_header.as_ref()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for the auth handler, built once at startup.
pub struct AuthState {
    config: AuthConfig,
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn CredentialStore>,
    decoy_hash: String,
}

impl AuthState {
    /// Build the state with a decoy hash at the default Argon2 cost.
    ///
    /// # Errors
    /// Returns an error if the decoy hash cannot be computed.
    pub fn new(
        config: AuthConfig,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, HashError> {
        let decoy_hash = verifier::hash_secret(&random_secret())?;
        Ok(Self::with_decoy_hash(config, limiter, store, decoy_hash))
    }

    /// Build the state with a caller-supplied decoy hash.
    ///
    /// The decoy should use the same cost parameters as the stored hashes so
    /// lookup misses and mismatches take comparable time.
    #[must_use]
    pub fn with_decoy_hash(
        config: AuthConfig,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn CredentialStore>,
        decoy_hash: String,
    ) -> Self {
        Self {
            config,
            limiter,
            store,
            decoy_hash,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn decoy_hash(&self) -> &str {
        &self.decoy_hash
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{rate_limit::NoopRateLimiter, store::MemoryCredentialStore};

    #[test]
    fn auth_config_defaults() {
        let config = AuthConfig::new();
        assert_eq!(config.realm(), "Restricted");
        assert_eq!(config.lookup_timeout(), Duration::from_secs(2));
        assert!(config.client_ip_header().is_none());
    }

    #[test]
    fn auth_config_builders() {
        let config = AuthConfig::new()
            .with_realm("Staff".to_string())
            .with_lookup_timeout(Duration::from_millis(250))
            .with_client_ip_header(Some(HeaderName::from_static("x-forwarded-for")));
        assert_eq!(config.realm(), "Staff");
        assert_eq!(config.lookup_timeout(), Duration::from_millis(250));
        assert_eq!(
            config.client_ip_header().map(HeaderName::as_str),
            Some("x-forwarded-for")
        );
    }

    #[test]
    fn new_state_has_parseable_decoy_hash() {
        let state = AuthState::new(
            AuthConfig::new(),
            Arc::new(NoopRateLimiter),
            Arc::new(MemoryCredentialStore::new()),
        )
        .unwrap();
        assert!(argon2::PasswordHash::new(state.decoy_hash()).is_ok());
    }

    #[test]
    fn random_secret_is_hex() {
        let secret = random_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, random_secret());
    }
}
