pub mod logging;
pub mod notify;
pub mod otp;
pub mod session;

use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        PossibleValuesParser,
    },
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_STORE: &str = "store";

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

    let command = Command::new("otpgate")
        .about("Passwordless one-time code login with account approval gating")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("OTPGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_STORE)
                .long("store")
                .help("Storage backend for credentials and accounts")
                .long_help(
                    "Storage backend for credentials and accounts. `memory` keeps everything in process and loses it on restart; use it for local development only.",
                )
                .env("OTPGATE_STORE")
                .default_value("postgres")
                .value_parser(PossibleValuesParser::new(["postgres", "memory"])),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string, required with --store postgres")
                .env("OTPGATE_DSN")
                .hide_env_values(true),
        );

    let command = otp::with_args(command);
    let command = session::with_args(command);
    let command = notify::with_args(command);
    logging::with_args(command)
}
