pub mod auth;
pub mod limits;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const SUBCOMMAND_SERVER: &str = "server";
pub const SUBCOMMAND_HASH: &str = "hash";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("authgate")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand(
            Command::new(SUBCOMMAND_SERVER)
                .about("Serve GET /auth, /healthz and /ready (default when no subcommand is given)"),
        )
        .subcommand(
            Command::new(SUBCOMMAND_HASH)
                .about("Read a secret from stdin and print its Argon2id PHC hash for the users table"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .global(true)
                .env("AUTHGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "Database connection string of the credential store, required by `server`. The `users` table must have `email` and `password` columns.",
                )
                .global(true)
                .env("AUTHGATE_DSN"),
        );

    let command = limits::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}
