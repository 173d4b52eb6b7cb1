use anyhow::{anyhow, Context};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_NOTIFY_WEBHOOK_URL: &str = "notify-webhook-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub webhook_url: Option<Url>,
}

impl Options {
    /// Parse notification arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the webhook URL is not an http(s) URL.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let webhook_url = match matches.get_one::<String>(ARG_NOTIFY_WEBHOOK_URL) {
            Some(raw) if !raw.trim().is_empty() => {
                let url = Url::parse(raw.trim())
                    .with_context(|| format!("invalid --notify-webhook-url: {raw}"))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(anyhow!("--notify-webhook-url must use http or https"));
                }
                Some(url)
            }
            _ => None,
        };

        Ok(Self { webhook_url })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_NOTIFY_WEBHOOK_URL)
            .long(ARG_NOTIFY_WEBHOOK_URL)
            .help("Relay endpoint that delivers codes and welcome messages")
            .long_help(
                "Relay endpoint that delivers codes and welcome messages. When unset, messages are written to the log instead of being delivered.",
            )
            .env("OTPGATE_NOTIFY_WEBHOOK_URL"),
    )
}
