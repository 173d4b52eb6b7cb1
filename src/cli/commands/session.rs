use crate::session::{DEFAULT_SESSION_TTL_SECONDS, MAX_SESSION_TTL_SECONDS};
use anyhow::anyhow;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SESSION_KEY: &str = "session-key";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub key: Option<SecretString>,
    pub ttl_seconds: i64,
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the TTL is outside `1..=MAX_SESSION_TTL_SECONDS`.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);
        if !(1..=MAX_SESSION_TTL_SECONDS).contains(&ttl_seconds) {
            return Err(anyhow!(
                "--session-ttl-seconds must be between 1 and {MAX_SESSION_TTL_SECONDS}"
            ));
        }

        Ok(Self {
            key: matches
                .get_one::<String>(ARG_SESSION_KEY)
                .filter(|value| !value.trim().is_empty())
                .map(|value| SecretString::from(value.trim().to_string())),
            ttl_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long(ARG_SESSION_KEY)
                .help("Base64-encoded 32-byte key for session tokens")
                .long_help(
                    "Base64-encoded 32-byte key for session tokens. When unset a random key is generated at startup and sessions do not survive a restart.",
                )
                .env("OTPGATE_SESSION_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token and cookie lifetime in seconds (at most 30 days)")
                .env("OTPGATE_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_optional() -> anyhow::Result<()> {
        temp_env::with_vars_unset(["OTPGATE_SESSION_KEY", "OTPGATE_SESSION_TTL_SECONDS"], || {
            let matches = with_args(Command::new("otpgate")).try_get_matches_from(["otpgate"])?;
            let options = Options::parse(&matches)?;
            assert!(options.key.is_none());
            assert_eq!(options.ttl_seconds, DEFAULT_SESSION_TTL_SECONDS);
            Ok(())
        })
    }

    #[test]
    fn debug_hides_key() -> anyhow::Result<()> {
        temp_env::with_vars([("OTPGATE_SESSION_KEY", Some("c2VjcmV0LWtleS1tYXRlcmlhbA=="))], || {
            let matches = with_args(Command::new("otpgate")).try_get_matches_from(["otpgate"])?;
            let options = Options::parse(&matches)?;
            assert!(options.key.is_some());
            assert!(!format!("{options:?}").contains("c2VjcmV0"));
            Ok(())
        })
    }

    #[test]
    fn rejects_out_of_range_ttl() {
        temp_env::with_vars_unset(["OTPGATE_SESSION_TTL_SECONDS"], || {
            for ttl in [
                "--session-ttl-seconds=-5",
                "--session-ttl-seconds=0",
                "--session-ttl-seconds=2592001",
                "--session-ttl-seconds=99999999999999",
            ] {
                let result =
                    with_args(Command::new("otpgate")).try_get_matches_from(["otpgate", ttl]);
                assert!(result.is_err(), "{ttl}");
            }
            let matches = with_args(Command::new("otpgate"))
                .try_get_matches_from(["otpgate", "--session-ttl-seconds=2592000"]);
            assert!(matches.is_ok_and(|matches| Options::parse(&matches).is_ok()));
        });
    }

    #[test]
    fn rejects_oversized_ttl_from_env() {
        temp_env::with_vars([("OTPGATE_SESSION_TTL_SECONDS", Some("9223372036854775807"))], || {
            let result = with_args(Command::new("otpgate")).try_get_matches_from(["otpgate"]);
            assert!(result.is_err());
        });
    }
}
