use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::time::Duration;

pub const ARG_QUOTA: &str = "rate-limit-quota";
pub const ARG_WINDOW: &str = "rate-limit-window";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_QUOTA)
                .long(ARG_QUOTA)
                .help("Maximum /auth requests per client origin and window (0 disables rate limiting)")
                .global(true)
                .env("AUTHGATE_RATE_LIMIT_QUOTA")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_WINDOW)
                .long(ARG_WINDOW)
                .help("Rate limit window in seconds")
                .global(true)
                .env("AUTHGATE_RATE_LIMIT_WINDOW")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub quota: u32,
    pub window: Duration,
}

impl Options {
    /// # Errors
    /// Returns an error if the rate limit arguments are missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let quota = matches
            .get_one::<u32>(ARG_QUOTA)
            .copied()
            .context("missing required argument: --rate-limit-quota")?;
        let window = matches
            .get_one::<u64>(ARG_WINDOW)
            .copied()
            .map(Duration::from_secs)
            .context("missing required argument: --rate-limit-window")?;

        Ok(Self { quota, window })
    }
}
