use crate::{
    api::{self, handlers::auth::AuthConfig, handlers::auth::AuthDeps, handlers::auth::AuthState},
    cli::telemetry,
    notify::{LogNotifier, Notifier, WebhookNotifier},
    otp::{Clock, CredentialHasher, MemoryOtpRepo, OtpRepo, PgOtpRepo, SystemClock},
    session::PasetoSessionTokens,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

/// Where credentials and accounts are kept.
pub enum Store {
    Postgres { dsn: SecretString },
    Memory,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres { .. } => f.write_str("Postgres { dsn: *** }"),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub store: Store,
    pub public_base_url: Url,
    pub otp_ttl_seconds: i64,
    pub otp_digits: u32,
    pub otp_max_attempts: i32,
    pub otp_pepper: Option<SecretString>,
    pub login_redirect: String,
    pub session_key: Option<SecretString>,
    pub session_ttl_seconds: i64,
    pub notify_webhook_url: Option<Url>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, a key is malformed, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let (repo, pool): (Arc<dyn OtpRepo>, Option<PgPool>) = match &args.store {
        Store::Postgres { dsn } => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;
            (Arc::new(PgOtpRepo::new(pool.clone())), Some(pool))
        }
        Store::Memory => {
            warn!("using in-memory store; codes and accounts are lost on restart");
            (Arc::new(MemoryOtpRepo::new()), None)
        }
    };

    let notifier: Arc<dyn Notifier> = match &args.notify_webhook_url {
        Some(url) => {
            info!(relay = %url.origin().ascii_serialization(), "delivering notifications via webhook");
            Arc::new(WebhookNotifier::new(url.clone())?)
        }
        None => {
            warn!("no --notify-webhook-url configured; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let pepper = args
        .otp_pepper
        .as_ref()
        .map(|pepper| pepper.expose_secret().as_bytes().to_vec());
    let hasher = Arc::new(CredentialHasher::new(pepper).context("Failed to build code hasher")?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session_ttl = chrono::Duration::try_seconds(args.session_ttl_seconds)
        .context("Session TTL is out of range")?;
    let sessions = Arc::new(
        PasetoSessionTokens::new(args.session_key.as_ref(), session_ttl, clock.clone())
            .context("Invalid session settings")?,
    );

    let config = AuthConfig::new(args.public_base_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_otp_digits(args.otp_digits)
        .with_otp_max_attempts(args.otp_max_attempts)
        .with_login_redirect(args.login_redirect);

    let auth_state = Arc::new(AuthState::new(
        config,
        AuthDeps {
            repo,
            notifier,
            hasher,
            sessions,
            clock,
        },
    ));

    let result = api::new(args.port, auth_state, pool).await;

    telemetry::shutdown_tracer();

    result
}
