//! Maps a verified identity plus its persisted account status to an access decision.

use anyhow::anyhow;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::identifier::normalize_email;
use super::models::{
    AccessDecision, Account, AccountStatus, NewAccountDefaults, VerificationOutcome,
};
use super::repo::{InsertAccountOutcome, OtpRepo};
use super::{Clock, OtpError};
use crate::notify::Notifier;

pub const DEFAULT_LOGIN_REDIRECT: &str = "/";

pub struct AccountGate {
    repo: Arc<dyn OtpRepo>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    redirect_to: String,
}

impl AccountGate {
    #[must_use]
    pub fn new(repo: Arc<dyn OtpRepo>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            notifier,
            clock,
            redirect_to: DEFAULT_LOGIN_REDIRECT.to_string(),
        }
    }

    #[must_use]
    pub fn with_redirect(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = redirect_to.into();
        self
    }

    /// Resolve access for `email` after verification.
    ///
    /// Anything other than `Verified` is turned back into the matching error, so
    /// an unverified identity can never reach the account lookup.
    ///
    /// # Errors
    /// `NotFound`/`Expired`/`Invalid` for non-verified outcomes, `Storage` for
    /// repository failures, `Dispatch` when the welcome message fails after the
    /// account was created.
    pub async fn resolve_access(
        &self,
        email: &str,
        outcome: VerificationOutcome,
        defaults: NewAccountDefaults,
    ) -> Result<AccessDecision, OtpError> {
        match outcome {
            VerificationOutcome::Verified => {}
            VerificationOutcome::NotFound => return Err(OtpError::NotFound),
            VerificationOutcome::Expired => return Err(OtpError::Expired),
            VerificationOutcome::Invalid => return Err(OtpError::Invalid),
        }

        let identifier = normalize_email(email);
        let existing = self
            .repo
            .find_account_by_email(&identifier)
            .await
            .map_err(OtpError::Storage)?;
        if let Some(account) = existing {
            return Ok(self.decide(account));
        }

        let account = Account {
            id: Uuid::now_v7(),
            email: identifier.clone(),
            status: AccountStatus::Pending,
            name: defaults.name,
            note: defaults.note,
            phone: defaults.phone,
            created_at: self.clock.now(),
        };
        match self
            .repo
            .insert_account(&account)
            .await
            .map_err(OtpError::Storage)?
        {
            InsertAccountOutcome::Created => {
                info!(identifier = %identifier, account_id = %account.id, "pending account created");
                self.notifier
                    .send_welcome(&identifier, account.name.as_deref())
                    .await
                    .map_err(OtpError::Dispatch)?;
                Ok(AccessDecision::PendingApprovalNewAccount {
                    account_id: account.id,
                })
            }
            InsertAccountOutcome::Conflict => {
                // Another request created the account between lookup and insert.
                warn!(identifier = %identifier, "account created concurrently; re-reading");
                let account = self
                    .repo
                    .find_account_by_email(&identifier)
                    .await
                    .map_err(OtpError::Storage)?
                    .ok_or_else(|| {
                        OtpError::Internal(anyhow!("account conflict for {identifier} but no row found"))
                    })?;
                Ok(self.decide(account))
            }
        }
    }

    fn decide(&self, account: Account) -> AccessDecision {
        match account.status {
            AccountStatus::Pending => AccessDecision::PendingApproval {
                account_id: account.id,
            },
            AccountStatus::Suspended => AccessDecision::Suspended {
                account_id: account.id,
            },
            AccountStatus::Approved => AccessDecision::LoggedIn {
                account,
                redirect_to: self.redirect_to.clone(),
            },
        }
    }
}
