use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::crypto::{self, CredentialHasher, MIN_CODE_DIGITS};
use super::identifier::{normalize_email, valid_email};
use super::models::{CodeIntent, VerificationCredential};
use super::repo::OtpRepo;
use super::{Clock, OtpError};
use crate::notify::Notifier;

pub const DEFAULT_TTL_SECONDS: i64 = 900;
pub const MAX_TTL_SECONDS: i64 = 86_400;
pub const DEFAULT_CODE_DIGITS: u32 = MIN_CODE_DIGITS;
pub const VERIFY_PATH: &str = "/v1/auth/otp/verify";

#[derive(Clone, Debug)]
pub struct IssuerConfig {
    public_base_url: Url,
    ttl: Duration,
    digits: u32,
}

impl IssuerConfig {
    /// Defaults: 15 minute lifetime, 6 digit codes.
    #[must_use]
    pub fn new(public_base_url: Url) -> Self {
        Self {
            public_base_url,
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
            digits: DEFAULT_CODE_DIGITS,
        }
    }

    /// Clamped to `1..=MAX_TTL_SECONDS`.
    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        if let Some(ttl) = Duration::try_seconds(seconds.clamp(1, MAX_TTL_SECONDS)) {
            self.ttl = ttl;
        }
        self
    }

    #[must_use]
    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = digits;
        self
    }

    #[must_use]
    pub fn public_base_url(&self) -> &Url {
        &self.public_base_url
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn digits(&self) -> u32 {
        self.digits
    }
}

/// Result of a successful issuance. Never carries the code or token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCode {
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
}

pub struct OtpIssuer {
    repo: Arc<dyn OtpRepo>,
    notifier: Arc<dyn Notifier>,
    hasher: Arc<CredentialHasher>,
    clock: Arc<dyn Clock>,
    config: IssuerConfig,
}

impl OtpIssuer {
    #[must_use]
    pub fn new(
        repo: Arc<dyn OtpRepo>,
        notifier: Arc<dyn Notifier>,
        hasher: Arc<CredentialHasher>,
        clock: Arc<dyn Clock>,
        config: IssuerConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            hasher,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Create a fresh credential for `email`, replacing any previous one, and
    /// dispatch the code and magic link.
    ///
    /// A dispatch failure leaves the stored credential in place; the caller
    /// simply requests a new code.
    ///
    /// # Errors
    /// `Validation` for a malformed email, `Storage` when the upsert fails,
    /// `Dispatch` when the notifier fails, `Internal` for RNG or hashing failures.
    pub async fn issue(&self, email: &str, intent: CodeIntent) -> Result<IssuedCode, OtpError> {
        let identifier = normalize_email(email);
        if identifier.is_empty() {
            return Err(OtpError::Validation("Email is required"));
        }
        if !valid_email(&identifier) {
            return Err(OtpError::Validation("Email is invalid"));
        }

        let code = crypto::generate_code(self.config.digits).map_err(OtpError::Internal)?;
        let link_token = crypto::generate_link_token().map_err(OtpError::Internal)?;
        let (code_hash, link_token_hash) =
            hash_pair(self.hasher.clone(), code.clone(), link_token.clone()).await?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.config.ttl)
            .ok_or_else(|| OtpError::Internal(anyhow!("credential expiry is out of range")))?;
        let credential = VerificationCredential {
            id: Uuid::now_v7(),
            identifier: identifier.clone(),
            code_hash,
            link_token_hash,
            expires_at,
            failed_attempts: 0,
            created_at: now,
        };
        self.repo
            .upsert_credential(&credential)
            .await
            .map_err(OtpError::Storage)?;
        debug!(identifier = %identifier, credential_id = %credential.id, "verification credential stored");

        let magic_link = build_magic_link(&self.config.public_base_url, &identifier, &link_token)
            .map_err(OtpError::Internal)?;
        self.notifier
            .send_code(&identifier, &code, magic_link.as_str(), intent)
            .await
            .map_err(OtpError::Dispatch)?;

        info!(identifier = %identifier, intent = intent.as_str(), "verification code issued");
        Ok(IssuedCode {
            identifier,
            expires_at: credential.expires_at,
        })
    }
}

/// Hash code and link token off the async runtime; Argon2 is deliberately slow.
async fn hash_pair(
    hasher: Arc<CredentialHasher>,
    code: String,
    link_token: String,
) -> Result<(String, String), OtpError> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<(String, String)> {
        Ok((hasher.hash(&code)?, hasher.hash(&link_token)?))
    })
    .await
    .map_err(|err| OtpError::Internal(anyhow!(err).context("hashing task failed")))?
    .map_err(OtpError::Internal)
}

/// `{base}/v1/auth/otp/verify?email=<email>&token=<token>`, keeping any path prefix on `base`.
///
/// # Errors
/// Returns an error if the base URL cannot carry a path.
pub fn build_magic_link(base: &Url, identifier: &str, token: &str) -> anyhow::Result<Url> {
    let base = base.as_str().trim_end_matches('/');
    let mut link = Url::parse(&format!("{base}{VERIFY_PATH}"))
        .with_context(|| format!("invalid public base URL: {base}"))?;
    link.query_pairs_mut()
        .clear()
        .append_pair("email", identifier)
        .append_pair("token", token);
    Ok(link)
}
