//! Map validated CLI matches to the action the binary executes.

use crate::cli::actions::{
    server::{Args, Store},
    Action,
};
use crate::cli::commands::{self, notify, otp, session};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Build the server action from parsed arguments.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let store = match matches
        .get_one::<String>(commands::ARG_STORE)
        .map(String::as_str)
    {
        Some("memory") => Store::Memory,
        _ => Store::Postgres {
            dsn: matches
                .get_one::<String>(commands::ARG_DSN)
                .filter(|dsn| !dsn.trim().is_empty())
                .map(|dsn| SecretString::from(dsn.clone()))
                .context("missing required argument: --dsn")?,
        },
    };

    let otp_opts = otp::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;
    let notify_opts = notify::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        store,
        public_base_url: otp_opts.public_base_url,
        otp_ttl_seconds: otp_opts.ttl_seconds,
        otp_digits: otp_opts.digits,
        otp_max_attempts: otp_opts.max_attempts,
        otp_pepper: otp_opts.pepper,
        login_redirect: otp_opts.login_redirect,
        session_key: session_opts.key,
        session_ttl_seconds: session_opts.ttl_seconds,
        notify_webhook_url: notify_opts.webhook_url,
    }))
}
