use anyhow::anyhow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::crypto::{self, CredentialHasher};
use super::identifier::{normalize_email, valid_email};
use super::issuer::DEFAULT_CODE_DIGITS;
use super::models::{SecretKind, VerificationOutcome};
use super::repo::{AttemptOutcome, OtpRepo};
use super::{Clock, OtpError};

pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
const MAX_LINK_TOKEN_LEN: usize = 128;

/// Checks a presented code or link token and consumes the credential on success.
pub struct OtpVerifier {
    repo: Arc<dyn OtpRepo>,
    hasher: Arc<CredentialHasher>,
    clock: Arc<dyn Clock>,
    max_attempts: i32,
    code_digits: u32,
}

impl OtpVerifier {
    #[must_use]
    pub fn new(repo: Arc<dyn OtpRepo>, hasher: Arc<CredentialHasher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            hasher,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            code_digits: DEFAULT_CODE_DIGITS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_code_digits(mut self, digits: u32) -> Self {
        self.code_digits = digits;
        self
    }

    /// Verify `presented` against the credential stored for `email`.
    ///
    /// Order matters:
    /// 1. missing credential: burn one dummy hash, `NotFound`
    /// 2. expired: `Expired` without hashing, row left for the next issuance
    /// 3. mismatch: count the attempt, `Invalid`
    /// 4. match: compare-and-delete; losing the race is `NotFound`
    ///
    /// # Errors
    /// `Validation` for malformed input (not counted as an attempt), `Storage`
    /// for repository failures, `Internal` for hashing failures.
    pub async fn verify(
        &self,
        email: &str,
        presented: &str,
        kind: SecretKind,
    ) -> Result<VerificationOutcome, OtpError> {
        let identifier = normalize_email(email);
        if identifier.is_empty() || !valid_email(&identifier) {
            return Err(OtpError::Validation("Email is invalid"));
        }
        let presented = presented.trim();
        match kind {
            SecretKind::Code => {
                if presented.is_empty() {
                    return Err(OtpError::Validation("Code is required"));
                }
                if !crypto::well_formed_code(presented, self.code_digits) {
                    return Err(OtpError::Validation("Code format is invalid"));
                }
            }
            SecretKind::LinkToken => {
                if presented.is_empty() {
                    return Err(OtpError::Validation("Token is required"));
                }
                if presented.len() > MAX_LINK_TOKEN_LEN {
                    return Err(OtpError::Validation("Token format is invalid"));
                }
            }
        }

        let credential = self
            .repo
            .find_credential(&identifier)
            .await
            .map_err(OtpError::Storage)?;

        let Some(credential) = credential else {
            self.burn_dummy(presented.to_string()).await?;
            debug!(identifier = %identifier, "no verification credential");
            return Ok(VerificationOutcome::NotFound);
        };

        if credential.is_expired(self.clock.now()) {
            debug!(identifier = %identifier, credential_id = %credential.id, "verification credential expired");
            return Ok(VerificationOutcome::Expired);
        }

        let stored_hash = match kind {
            SecretKind::Code => credential.code_hash.clone(),
            SecretKind::LinkToken => credential.link_token_hash.clone(),
        };
        if !self.matches(presented.to_string(), stored_hash).await? {
            let attempt = self
                .repo
                .record_failed_attempt(&identifier, credential.id, self.max_attempts)
                .await
                .map_err(OtpError::Storage)?;
            match attempt {
                AttemptOutcome::Recorded { failed_attempts } => {
                    warn!(identifier = %identifier, failed_attempts, "verification attempt rejected");
                }
                AttemptOutcome::Exhausted => {
                    warn!(identifier = %identifier, "verification attempts exhausted; credential revoked");
                }
                AttemptOutcome::Gone => {}
            }
            return Ok(VerificationOutcome::Invalid);
        }

        let consumed = self
            .repo
            .delete_credential(&identifier, credential.id)
            .await
            .map_err(OtpError::Storage)?;
        if !consumed {
            debug!(identifier = %identifier, "verification credential consumed concurrently");
            return Ok(VerificationOutcome::NotFound);
        }

        info!(identifier = %identifier, "verification credential consumed");
        Ok(VerificationOutcome::Verified)
    }

    async fn matches(&self, presented: String, stored_hash: String) -> Result<bool, OtpError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&presented, &stored_hash))
            .await
            .map_err(|err| OtpError::Internal(anyhow!(err).context("verification task failed")))?
            .map_err(OtpError::Internal)
    }

    async fn burn_dummy(&self, presented: String) -> Result<(), OtpError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&presented))
            .await
            .map_err(|err| OtpError::Internal(anyhow!(err).context("verification task failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::memory::MemoryOtpRepo;
    use crate::otp::models::VerificationCredential;
    use crate::otp::test_support::fast_hasher;
    use crate::otp::ManualClock;
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    const CODE: &str = "482913";
    const TOKEN: &str = "dGhpcy1pcy1hLWxpbmstdG9rZW4";

    struct Fixture {
        repo: Arc<MemoryOtpRepo>,
        clock: Arc<ManualClock>,
        verifier: OtpVerifier,
    }

    async fn fixture(max_attempts: i32) -> Result<Fixture> {
        let repo = Arc::new(MemoryOtpRepo::new());
        let hasher = fast_hasher();
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        repo.upsert_credential(&VerificationCredential {
            id: Uuid::now_v7(),
            identifier: "a@x.com".to_string(),
            code_hash: hasher.hash(CODE)?,
            link_token_hash: hasher.hash(TOKEN)?,
            expires_at: now + Duration::seconds(900),
            failed_attempts: 0,
            created_at: now,
        })
        .await?;
        let verifier = OtpVerifier::new(repo.clone(), hasher, clock.clone())
            .with_max_attempts(max_attempts);
        Ok(Fixture {
            repo,
            clock,
            verifier,
        })
    }

    #[tokio::test]
    async fn correct_code_verifies_once() -> Result<()> {
        let fx = fixture(5).await?;
        assert_eq!(
            fx.verifier.verify("A@x.com ", CODE, SecretKind::Code).await?,
            VerificationOutcome::Verified
        );
        assert_eq!(fx.repo.credential_count().await, 0);
        assert_eq!(
            fx.verifier.verify("a@x.com", CODE, SecretKind::Code).await?,
            VerificationOutcome::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn link_token_consumes_the_same_credential() -> Result<()> {
        let fx = fixture(5).await?;
        assert_eq!(
            fx.verifier.verify("a@x.com", CODE, SecretKind::LinkToken).await?,
            VerificationOutcome::Invalid
        );
        assert_eq!(
            fx.verifier.verify("a@x.com", TOKEN, SecretKind::LinkToken).await?,
            VerificationOutcome::Verified
        );
        assert_eq!(
            fx.verifier.verify("a@x.com", CODE, SecretKind::Code).await?,
            VerificationOutcome::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_is_invalid_and_keeps_credential() -> Result<()> {
        let fx = fixture(5).await?;
        assert_eq!(
            fx.verifier.verify("a@x.com", "000000", SecretKind::Code).await?,
            VerificationOutcome::Invalid
        );
        let stored = fx.repo.find_credential("a@x.com").await?;
        assert_eq!(stored.map(|c| c.failed_attempts), Some(1));
        assert_eq!(
            fx.verifier.verify("a@x.com", CODE, SecretKind::Code).await?,
            VerificationOutcome::Verified
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_is_reported_without_consuming() -> Result<()> {
        let fx = fixture(5).await?;
        fx.clock.advance(Duration::seconds(901));
        assert_eq!(
            fx.verifier.verify("a@x.com", CODE, SecretKind::Code).await?,
            VerificationOutcome::Expired
        );
        assert_eq!(fx.repo.credential_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn attempts_limit_revokes_credential() -> Result<()> {
        let fx = fixture(3).await?;
        for _ in 0..3 {
            assert_eq!(
                fx.verifier.verify("a@x.com", "111111", SecretKind::Code).await?,
                VerificationOutcome::Invalid
            );
        }
        assert_eq!(
            fx.verifier.verify("a@x.com", CODE, SecretKind::Code).await?,
            VerificationOutcome::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_input_is_validation_and_not_counted() -> Result<()> {
        let fx = fixture(5).await?;
        for (email, code) in [("a@x.com", ""), ("a@x.com", "12ab56"), ("a@x.com", "1234567"), ("nope", CODE)] {
            let result = fx.verifier.verify(email, code, SecretKind::Code).await;
            assert!(matches!(result, Err(OtpError::Validation(_))), "{email:?} {code:?}");
        }
        let stored = fx.repo.find_credential("a@x.com").await?;
        assert_eq!(stored.map(|c| c.failed_attempts), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_verifications_yield_one_success() -> Result<()> {
        let fx = Arc::new(fixture(5).await?);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let fx = fx.clone();
            handles.push(tokio::spawn(async move {
                fx.verifier.verify("a@x.com", CODE, SecretKind::Code).await
            }));
        }
        let mut verified = 0;
        for handle in handles {
            match handle.await?? {
                VerificationOutcome::Verified => verified += 1,
                VerificationOutcome::NotFound => {}
                other => anyhow::bail!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(verified, 1);
        Ok(())
    }
}
