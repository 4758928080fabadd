//! # Authgate (HTTP Basic credential verification)
//!
//! `authgate` answers a single question for the callers in front of it: is this
//! `identity:secret` pair valid? A request to `GET /auth` carrying
//! `Authorization: Basic <base64(identity:secret)>` is classified into exactly
//! one outcome and answered with a status code, with no session state kept
//! between requests.
//!
//! ## Request Pipeline
//!
//! 1. **Rate limiting:** every request to `/auth` consumes one unit of the
//!    client origin's fixed-window budget (5 per 60 seconds by default), before
//!    the header is even parsed.
//! 2. **Credential extraction:** the `Basic` header is decoded and split on the
//!    first `:`.
//! 3. **Lookup:** the stored secret for the identity is fetched from the
//!    `users` table, bounded by a deadline.
//! 4. **Verification:** Argon2 PHC hashes are verified in constant time. Legacy
//!    plaintext values are only accepted when explicitly enabled.
//! 5. **Response:** `200`, `401` (with a `WWW-Authenticate` challenge) or `429`.
//!
//! ## Enumeration Resistance
//!
//! An unknown identity, a failing store, a lookup timeout and a wrong secret all
//! produce the same `401 Invalid credentials` response. Lookup misses still run
//! one hash verification against a decoy hash so their timing matches a
//! mismatch. The distinction is only visible in the service logs.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
