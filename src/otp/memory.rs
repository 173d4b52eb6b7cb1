//! In-process `OtpRepo` used by tests and `--store memory` deployments.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{Account, AccountStatus, VerificationCredential};
use super::repo::{AttemptOutcome, InsertAccountOutcome, OtpRepo};

#[derive(Debug, Default)]
struct State {
    credentials: HashMap<String, VerificationCredential>,
    accounts: HashMap<String, Account>,
}

/// Single-mutex store; each trait method is one critical section, which gives
/// the same atomicity the Postgres statements provide.
#[derive(Debug, Default)]
pub struct MemoryOtpRepo {
    state: Mutex<State>,
}

impl MemoryOtpRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change an account's status, standing in for an administrator action.
    /// Returns `false` when no account has that email.
    pub async fn set_account_status(&self, email: &str, status: AccountStatus) -> bool {
        let mut state = self.state.lock().await;
        match state.accounts.get_mut(email) {
            Some(account) => {
                account.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn credential_count(&self) -> usize {
        self.state.lock().await.credentials.len()
    }

    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }
}

#[async_trait]
impl OtpRepo for MemoryOtpRepo {
    async fn find_credential(&self, identifier: &str) -> Result<Option<VerificationCredential>> {
        Ok(self.state.lock().await.credentials.get(identifier).cloned())
    }

    async fn upsert_credential(&self, credential: &VerificationCredential) -> Result<()> {
        let mut stored = credential.clone();
        stored.failed_attempts = 0;
        self.state
            .lock()
            .await
            .credentials
            .insert(stored.identifier.clone(), stored);
        Ok(())
    }

    async fn delete_credential(&self, identifier: &str, credential_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let matches = state
            .credentials
            .get(identifier)
            .is_some_and(|credential| credential.id == credential_id);
        if matches {
            state.credentials.remove(identifier);
        }
        Ok(matches)
    }

    async fn record_failed_attempt(
        &self,
        identifier: &str,
        credential_id: Uuid,
        max_attempts: i32,
    ) -> Result<AttemptOutcome> {
        let mut state = self.state.lock().await;
        let Some(credential) = state
            .credentials
            .get_mut(identifier)
            .filter(|credential| credential.id == credential_id)
        else {
            return Ok(AttemptOutcome::Gone);
        };

        credential.failed_attempts += 1;
        let failed_attempts = credential.failed_attempts;
        if failed_attempts < max_attempts {
            return Ok(AttemptOutcome::Recorded { failed_attempts });
        }

        state.credentials.remove(identifier);
        Ok(AttemptOutcome::Exhausted)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(email).cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<InsertAccountOutcome> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.email) {
            return Ok(InsertAccountOutcome::Conflict);
        }
        state
            .accounts
            .insert(account.email.clone(), account.clone());
        Ok(InsertAccountOutcome::Created)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn credential(identifier: &str) -> VerificationCredential {
        let now = Utc::now();
        VerificationCredential {
            id: Uuid::now_v7(),
            identifier: identifier.to_string(),
            code_hash: "code".to_string(),
            link_token_hash: "link".to_string(),
            expires_at: now + Duration::minutes(15),
            failed_attempts: 3,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_resets_attempts() -> Result<()> {
        let repo = MemoryOtpRepo::new();
        let first = credential("a@x.com");
        let second = credential("a@x.com");
        repo.upsert_credential(&first).await?;
        repo.upsert_credential(&second).await?;

        assert_eq!(repo.credential_count().await, 1);
        let stored = repo.find_credential("a@x.com").await?;
        assert_eq!(stored.as_ref().map(|c| c.id), Some(second.id));
        assert_eq!(stored.map(|c| c.failed_attempts), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn delete_requires_matching_id() -> Result<()> {
        let repo = MemoryOtpRepo::new();
        let stored = credential("a@x.com");
        repo.upsert_credential(&stored).await?;

        assert!(!repo.delete_credential("a@x.com", Uuid::now_v7()).await?);
        assert!(repo.delete_credential("a@x.com", stored.id).await?);
        assert!(!repo.delete_credential("a@x.com", stored.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn attempts_exhaust_credential() -> Result<()> {
        let repo = MemoryOtpRepo::new();
        let stored = credential("a@x.com");
        repo.upsert_credential(&stored).await?;

        for expected in 1..3 {
            assert_eq!(
                repo.record_failed_attempt("a@x.com", stored.id, 3).await?,
                AttemptOutcome::Recorded {
                    failed_attempts: expected
                }
            );
        }
        assert_eq!(
            repo.record_failed_attempt("a@x.com", stored.id, 3).await?,
            AttemptOutcome::Exhausted
        );
        assert_eq!(repo.credential_count().await, 0);
        assert_eq!(
            repo.record_failed_attempt("a@x.com", stored.id, 3).await?,
            AttemptOutcome::Gone
        );
        Ok(())
    }

    #[tokio::test]
    async fn insert_account_conflicts_on_email() -> Result<()> {
        let repo = MemoryOtpRepo::new();
        let account = Account {
            id: Uuid::now_v7(),
            email: "a@x.com".to_string(),
            status: AccountStatus::Pending,
            name: None,
            note: None,
            phone: None,
            created_at: Utc::now(),
        };
        assert_eq!(
            repo.insert_account(&account).await?,
            InsertAccountOutcome::Created
        );
        assert_eq!(
            repo.insert_account(&account).await?,
            InsertAccountOutcome::Conflict
        );
        assert!(repo.set_account_status("a@x.com", AccountStatus::Approved).await);
        assert!(!repo.set_account_status("b@x.com", AccountStatus::Approved).await);
        let stored = repo.find_account_by_email("a@x.com").await?;
        assert_eq!(stored.map(|a| a.status), Some(AccountStatus::Approved));
        Ok(())
    }
}
