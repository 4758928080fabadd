//! Secret verification.
//!
//! Dispatches on the stored representation:
//!
//! - `Hashed`: Argon2 (PHC string) or bcrypt verification. The presented secret
//!   is run through the full key derivation with the stored salt and cost and
//!   the derived output is compared in constant time, so the running time does
//!   not depend on how many leading characters of the secret are correct.
//! - `Plaintext`: direct string equality. This variant gives no timing
//!   protection and no protection against a compromised store. It exists for
//!   legacy deployments only and is off unless explicitly enabled.

use argon2::{
    password_hash::SaltString, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

use super::store::{HashScheme, StoredSecret};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Match,
    NoMatch,
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid Argon2 parameters: {0}")]
    Params(argon2::Error),
    #[error("failed to hash secret: {0}")]
    Hash(argon2::password_hash::Error),
}

/// Compare a presented secret against its stored representation.
#[must_use]
pub fn verify(presented: &SecretString, stored: &StoredSecret) -> Verification {
    let matched = match stored {
        StoredSecret::Hashed(HashScheme::Argon2, phc) => {
            verify_argon2(presented.expose_secret(), phc)
        }
        StoredSecret::Hashed(HashScheme::Bcrypt, digest) => {
            verify_bcrypt(presented.expose_secret(), digest)
        }
        StoredSecret::Plaintext(value) => presented.expose_secret() == value,
    };

    if matched {
        Verification::Match
    } else {
        Verification::NoMatch
    }
}

fn verify_argon2(presented: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    // Algorithm, version and cost are read from the PHC string itself.
    Argon2::default()
        .verify_password(presented.as_bytes(), &parsed)
        .is_ok()
}

fn verify_bcrypt(presented: &str, digest: &str) -> bool {
    // Malformed digests and wrong secrets both end up as a mismatch.
    bcrypt::verify(presented, digest).unwrap_or(false)
}

/// Hash a secret into an Argon2id PHC string with the default cost parameters.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_secret(secret: &str) -> Result<String, HashError> {
    hash_secret_with_params(secret, Params::default())
}

/// Hash a secret into an Argon2id PHC string with explicit cost parameters.
///
/// # Errors
/// Returns an error if the parameters are invalid or hashing fails.
pub fn hash_secret_with_params(secret: &str, params: Params) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(HashError::Hash)?
        .to_string();
    Ok(hash)
}

/// Cheap cost parameters for tests.
///
/// # Errors
/// Returns an error if the parameters are rejected by `argon2`.
pub fn low_cost_params() -> Result<Params, HashError> {
    Params::new(Params::MIN_M_COST * 64, 1, 1, None).map_err(HashError::Params)
}
