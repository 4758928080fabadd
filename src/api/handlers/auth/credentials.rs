//! HTTP Basic credential extraction.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64ct::{Base64, Encoding};
use secrecy::SecretString;
use std::fmt;

/// Scheme prefix required on the `Authorization` header (case-sensitive).
pub const BASIC_SCHEME_PREFIX: &str = "Basic ";

const SEPARATOR: char = ':';

/// Why a header could not be turned into credentials.
///
/// Only used for logging; every variant is answered with the same `401`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedCredentials {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("authorization header is not valid visible ASCII")]
    InvalidHeader,
    #[error("authorization header does not use the Basic scheme")]
    MissingScheme,
    #[error("basic payload is not valid base64")]
    InvalidEncoding,
    #[error("basic payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("basic payload has no separator")]
    MissingSeparator,
    #[error("basic payload has an empty identity")]
    EmptyIdentity,
}

/// An identity and the secret presented with it on this request.
pub struct Credentials {
    identity: String,
    secret: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    #[must_use]
    pub fn into_parts(self) -> (String, SecretString) {
        (self.identity, self.secret)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

/// Extract Basic credentials from request headers.
///
/// # Errors
/// Returns the reason the `Authorization` header is missing or malformed.
pub fn extract(headers: &HeaderMap) -> Result<Credentials, MalformedCredentials> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(MalformedCredentials::MissingHeader)?
        .to_str()
        .map_err(|_| MalformedCredentials::InvalidHeader)?;

    parse_basic(value)
}

/// Parse a raw `Authorization` header value.
///
/// The decoded payload is split on the first `:` only, so the secret may
/// itself contain `:`.
///
/// # Errors
/// Returns the reason the value is not a usable Basic credential.
pub fn parse_basic(value: &str) -> Result<Credentials, MalformedCredentials> {
    let encoded = value
        .strip_prefix(BASIC_SCHEME_PREFIX)
        .ok_or(MalformedCredentials::MissingScheme)?;

    let decoded = Base64::decode_vec(encoded).map_err(|_| MalformedCredentials::InvalidEncoding)?;
    let payload = String::from_utf8(decoded).map_err(|_| MalformedCredentials::InvalidUtf8)?;

    let (identity, secret) = payload
        .split_once(SEPARATOR)
        .ok_or(MalformedCredentials::MissingSeparator)?;

    if identity.is_empty() {
        return Err(MalformedCredentials::EmptyIdentity);
    }

    Ok(Credentials {
        identity: identity.to_string(),
        secret: SecretString::from(secret.to_string()),
    })
}

/// Build a `Basic` header value for an identity/secret pair.
#[must_use]
pub fn encode_basic(identity: &str, secret: &str) -> String {
    let payload = format!("{identity}{SEPARATOR}{secret}");
    format!("{BASIC_SCHEME_PREFIX}{}", Base64::encode_string(payload.as_bytes()))
}
