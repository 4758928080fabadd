use anyhow::{Context, Result};
use axum::http::HeaderName;
use clap::{Arg, ArgAction, Command};
use std::time::Duration;

pub const ARG_REALM: &str = "realm";
pub const ARG_LOOKUP_TIMEOUT: &str = "lookup-timeout";
pub const ARG_CLIENT_IP_HEADER: &str = "client-ip-header";
pub const ARG_LEGACY_PLAINTEXT: &str = "legacy-plaintext-secrets";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REALM)
                .long(ARG_REALM)
                .help("Realm named in the WWW-Authenticate challenge")
                .global(true)
                .env("AUTHGATE_REALM")
                .default_value("Restricted"),
        )
        .arg(
            Arg::new(ARG_LOOKUP_TIMEOUT)
                .long(ARG_LOOKUP_TIMEOUT)
                .help("Deadline for a credential lookup in milliseconds")
                .global(true)
                .env("AUTHGATE_LOOKUP_TIMEOUT")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CLIENT_IP_HEADER)
                .long(ARG_CLIENT_IP_HEADER)
                .help("Trusted proxy header carrying the client IP, e.g. X-Forwarded-For (default: peer address)")
                .global(true)
                .env("AUTHGATE_CLIENT_IP_HEADER"),
        )
        .arg(
            Arg::new(ARG_LEGACY_PLAINTEXT)
                .long(ARG_LEGACY_PLAINTEXT)
                .help("INSECURE: accept stored secrets that are not password hashes and compare them as plaintext")
                .global(true)
                .env("AUTHGATE_LEGACY_PLAINTEXT_SECRETS")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub realm: String,
    pub lookup_timeout: Duration,
    pub client_ip_header: Option<HeaderName>,
    pub legacy_plaintext: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if an argument is missing or the client IP header name is invalid.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let realm = matches
            .get_one::<String>(ARG_REALM)
            .cloned()
            .context("missing required argument: --realm")?;
        let lookup_timeout = matches
            .get_one::<u64>(ARG_LOOKUP_TIMEOUT)
            .copied()
            .map(Duration::from_millis)
            .context("missing required argument: --lookup-timeout")?;
        let client_ip_header = matches
            .get_one::<String>(ARG_CLIENT_IP_HEADER)
            .map(|name| {
                HeaderName::try_from(name.to_ascii_lowercase())
                    .with_context(|| format!("invalid --client-ip-header: {name}"))
            })
            .transpose()?;
        let legacy_plaintext = matches.get_flag(ARG_LEGACY_PLAINTEXT);

        Ok(Self {
            realm,
            lookup_timeout,
            client_ip_header,
            legacy_plaintext,
        })
    }
}
