//! Credential store gateway.
//!
//! The store only answers "what is the stored secret for this identity". Absent
//! identities and failing lookups are told apart here, for logging, and then
//! collapsed into the same rejection by the handler.

use argon2::PasswordHash;
use sqlx::{Connection, PgPool};
use std::{collections::HashMap, fmt, future::Future, pin::Pin};
use tracing::{info_span, Instrument};

const LOOKUP_QUERY: &str = "SELECT password FROM users WHERE email = $1";

/// Digest algorithm of a `Hashed` secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashScheme {
    /// PHC string, `$argon2id$v=19$...`.
    Argon2,
    /// Modular crypt format, `$2a$`, `$2b$`, `$2x$` or `$2y$`.
    Bcrypt,
}

impl HashScheme {
    /// Recognize a stored digest this service can verify.
    #[must_use]
    pub fn detect(raw: &str) -> Option<Self> {
        if BCRYPT_PREFIXES.iter().any(|prefix| raw.starts_with(prefix)) {
            return Some(Self::Bcrypt);
        }
        match PasswordHash::new(raw) {
            Ok(parsed) if parsed.algorithm.as_str().starts_with("argon2") => Some(Self::Argon2),
            _ => None,
        }
    }
}

const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Persisted form of a secret, tagged by how it must be compared.
#[derive(Clone, PartialEq, Eq)]
pub enum StoredSecret {
    /// Salted one-way digest.
    Hashed(HashScheme, String),
    /// Legacy cleartext value. Only produced when legacy plaintext mode is on.
    Plaintext(String),
}

impl StoredSecret {
    /// Tag a raw stored value.
    ///
    /// Argon2 PHC strings and bcrypt hashes are `Hashed`. A value shaped like a
    /// crypt hash (`$<id>$...`) that is neither is never treated as plaintext.
    /// Anything else is `Plaintext` when `legacy_plaintext` is enabled.
    ///
    /// # Errors
    /// Returns `StoreError::UnrecognizedSecret` for unsupported hashes, and for
    /// non-hash values while legacy plaintext mode is disabled.
    pub fn classify(raw: String, legacy_plaintext: bool) -> Result<Self, StoreError> {
        if let Some(scheme) = HashScheme::detect(&raw) {
            Ok(Self::Hashed(scheme, raw))
        } else if legacy_plaintext && !looks_like_crypt_hash(&raw) {
            Ok(Self::Plaintext(raw))
        } else {
            Err(StoreError::UnrecognizedSecret)
        }
    }
}

/// `$<id>$` with an id of lowercase letters, digits or `-`.
fn looks_like_crypt_hash(raw: &str) -> bool {
    raw.strip_prefix('$')
        .and_then(|rest| rest.split_once('$'))
        .is_some_and(|(id, _)| {
            !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        })
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hashed(scheme, _) => write!(f, "Hashed({scheme:?}, ***)"),
            Self::Plaintext(_) => f.write_str("Plaintext(***)"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored secret is an unsupported hash, or plaintext while legacy plaintext mode is disabled")]
    UnrecognizedSecret,
}

pub type LookupFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<StoredSecret>, StoreError>> + Send + 'a>>;
pub type PingFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

pub trait CredentialStore: Send + Sync {
    /// Fetch the stored secret for `identity`, `None` if the identity is unknown.
    fn lookup<'a>(&'a self, identity: &'a str) -> LookupFuture<'a>;

    /// Check that the store is reachable.
    fn ping(&self) -> PingFuture<'_>;
}

/// Store backed by the `users` table.
#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
    legacy_plaintext: bool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool, legacy_plaintext: bool) -> Self {
        Self {
            pool,
            legacy_plaintext,
        }
    }
}

impl CredentialStore for PgCredentialStore {
    fn lookup<'a>(&'a self, identity: &'a str) -> LookupFuture<'a> {
        Box::pin(async move {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = LOOKUP_QUERY
            );
            let row: Option<(String,)> = sqlx::query_as(LOOKUP_QUERY)
                .bind(identity)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;

            row.map(|(raw,)| StoredSecret::classify(raw, self.legacy_plaintext))
                .transpose()
        })
    }

    fn ping(&self) -> PingFuture<'_> {
        Box::pin(async move {
            let acquire_span = info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            );
            let mut conn = self.pool.acquire().instrument(acquire_span).await?;
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            conn.ping().instrument(ping_span).await?;
            Ok(())
        })
    }
}

/// In-process store, for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore {
    users: HashMap<String, StoredSecret>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, identity: impl Into<String>, secret: StoredSecret) -> Self {
        self.users.insert(identity.into(), secret);
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup<'a>(&'a self, identity: &'a str) -> LookupFuture<'a> {
        let found = self.users.get(identity).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn ping(&self) -> PingFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}
