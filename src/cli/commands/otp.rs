use crate::otp::{
    crypto::{MAX_CODE_DIGITS, MIN_CODE_DIGITS},
    gate::DEFAULT_LOGIN_REDIRECT,
    issuer::MAX_TTL_SECONDS,
};
use anyhow::{anyhow, Context};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_PUBLIC_BASE_URL: &str = "public-base-url";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_OTP_DIGITS: &str = "otp-digits";
pub const ARG_OTP_MAX_ATTEMPTS: &str = "otp-max-attempts";
pub const ARG_OTP_PEPPER: &str = "otp-pepper";
pub const ARG_LOGIN_REDIRECT: &str = "login-redirect";

#[derive(Debug, Clone)]
pub struct Options {
    pub public_base_url: Url,
    pub ttl_seconds: i64,
    pub digits: u32,
    pub max_attempts: i32,
    pub pepper: Option<SecretString>,
    pub login_redirect: String,
}

impl Options {
    /// Parse OTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the base URL is not an absolute http(s) URL or a
    /// numeric setting is out of range.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let raw_url = matches
            .get_one::<String>(ARG_PUBLIC_BASE_URL)
            .context("missing required argument: --public-base-url")?;
        let public_base_url =
            Url::parse(raw_url).with_context(|| format!("invalid --public-base-url: {raw_url}"))?;
        if !matches!(public_base_url.scheme(), "http" | "https") {
            return Err(anyhow!("--public-base-url must use http or https"));
        }

        let ttl_seconds = matches
            .get_one::<i64>(ARG_OTP_TTL_SECONDS)
            .copied()
            .unwrap_or(crate::otp::issuer::DEFAULT_TTL_SECONDS);
        if !(1..=MAX_TTL_SECONDS).contains(&ttl_seconds) {
            return Err(anyhow!("--otp-ttl-seconds must be between 1 and {MAX_TTL_SECONDS}"));
        }

        let max_attempts = matches
            .get_one::<i32>(ARG_OTP_MAX_ATTEMPTS)
            .copied()
            .unwrap_or(crate::otp::verifier::DEFAULT_MAX_ATTEMPTS);
        if max_attempts < 1 {
            return Err(anyhow!("--otp-max-attempts must be at least 1"));
        }

        let login_redirect = matches
            .get_one::<String>(ARG_LOGIN_REDIRECT)
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOGIN_REDIRECT.to_string());
        if !login_redirect.starts_with('/') || login_redirect.starts_with("//") {
            return Err(anyhow!("--login-redirect must be a local path"));
        }

        Ok(Self {
            public_base_url,
            ttl_seconds,
            digits: matches
                .get_one::<u32>(ARG_OTP_DIGITS)
                .copied()
                .unwrap_or(crate::otp::issuer::DEFAULT_CODE_DIGITS),
            max_attempts,
            pepper: matches
                .get_one::<String>(ARG_OTP_PEPPER)
                .filter(|value| !value.is_empty())
                .map(|value| SecretString::from(value.clone())),
            login_redirect,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_BASE_URL)
                .long(ARG_PUBLIC_BASE_URL)
                .help("Public base URL used for magic links and the CORS origin")
                .env("OTPGATE_PUBLIC_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("Lifetime of an issued code in seconds (at most one day)")
                .env("OTPGATE_OTP_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_OTP_DIGITS)
                .long(ARG_OTP_DIGITS)
                .help("Number of digits in an issued code")
                .env("OTPGATE_OTP_DIGITS")
                .default_value("6")
                .value_parser(
                    clap::value_parser!(u32)
                        .range(i64::from(MIN_CODE_DIGITS)..=i64::from(MAX_CODE_DIGITS)),
                ),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_ATTEMPTS)
                .long(ARG_OTP_MAX_ATTEMPTS)
                .help("Wrong guesses allowed before a code is revoked")
                .env("OTPGATE_OTP_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new(ARG_OTP_PEPPER)
                .long(ARG_OTP_PEPPER)
                .help("Server-side secret mixed into code hashes")
                .env("OTPGATE_OTP_PEPPER")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_REDIRECT)
                .long(ARG_LOGIN_REDIRECT)
                .help("Path returned to approved accounts after login")
                .env("OTPGATE_LOGIN_REDIRECT")
                .default_value(DEFAULT_LOGIN_REDIRECT),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const VARS: [&str; 6] = [
        "OTPGATE_PUBLIC_BASE_URL",
        "OTPGATE_OTP_TTL_SECONDS",
        "OTPGATE_OTP_DIGITS",
        "OTPGATE_OTP_MAX_ATTEMPTS",
        "OTPGATE_OTP_PEPPER",
        "OTPGATE_LOGIN_REDIRECT",
    ];

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        let matches = with_args(Command::new("otpgate")).try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        temp_env::with_vars_unset(VARS, || {
            let options = parse(&["otpgate"])?;
            assert_eq!(options.public_base_url.as_str(), "http://localhost:8080/");
            assert_eq!(options.ttl_seconds, 900);
            assert_eq!(options.digits, 6);
            assert_eq!(options.max_attempts, 5);
            assert!(options.pepper.is_none());
            assert_eq!(options.login_redirect, "/");
            Ok(())
        })
    }

    #[test]
    fn reads_env() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("OTPGATE_PUBLIC_BASE_URL", Some("https://auth.example.com/app")),
                ("OTPGATE_OTP_DIGITS", Some("8")),
                ("OTPGATE_OTP_PEPPER", Some("pepper")),
                ("OTPGATE_LOGIN_REDIRECT", Some("/dashboard")),
            ],
            || {
                let options = parse(&["otpgate"])?;
                assert_eq!(options.public_base_url.path(), "/app");
                assert_eq!(options.digits, 8);
                assert_eq!(
                    options.pepper.as_ref().map(|p| p.expose_secret().to_string()),
                    Some("pepper".to_string())
                );
                assert_eq!(options.login_redirect, "/dashboard");
                Ok(())
            },
        )
    }

    #[test]
    fn ttl_accepts_up_to_one_day() -> anyhow::Result<()> {
        temp_env::with_vars_unset(VARS, || {
            let options = parse(&["otpgate", "--otp-ttl-seconds", "86400"])?;
            assert_eq!(options.ttl_seconds, MAX_TTL_SECONDS);
            Ok(())
        })
    }

    #[test]
    fn rejects_bad_values() {
        temp_env::with_vars_unset(VARS, || {
            assert!(parse(&["otpgate", "--otp-digits", "4"]).is_err());
            assert!(parse(&["otpgate", "--otp-ttl-seconds", "0"]).is_err());
            assert!(parse(&["otpgate", "--otp-ttl-seconds", "86401"]).is_err());
            assert!(parse(&["otpgate", "--otp-ttl-seconds", "1000000000000000"]).is_err());
            assert!(parse(&["otpgate", "--otp-max-attempts", "0"]).is_err());
            assert!(parse(&["otpgate", "--public-base-url", "ftp://example.com"]).is_err());
            assert!(parse(&["otpgate", "--login-redirect", "https://evil.example"]).is_err());
            assert!(parse(&["otpgate", "--login-redirect", "//evil.example"]).is_err());
        });
    }
}
