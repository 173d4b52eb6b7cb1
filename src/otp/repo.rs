//! Storage contract for credentials and accounts, plus the Postgres implementation.
//!
//! Every method is a single-row operation. Consumption and attempt counting are
//! keyed by `(identifier, id)` so a caller can only touch the exact credential
//! it read; a newer issuance for the same identifier gets a new `id`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{Account, VerificationCredential};

/// Outcome of inserting an account whose email may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAccountOutcome {
    Created,
    Conflict,
}

/// Outcome of recording a mismatching presentation against a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Counter incremented; the credential stays usable.
    Recorded { failed_attempts: i32 },
    /// Attempt limit reached; the credential was deleted.
    Exhausted,
    /// The credential was already consumed or replaced.
    Gone,
}

#[async_trait]
pub trait OtpRepo: Send + Sync {
    async fn find_credential(&self, identifier: &str) -> Result<Option<VerificationCredential>>;

    /// Insert or replace the single credential for `credential.identifier`.
    async fn upsert_credential(&self, credential: &VerificationCredential) -> Result<()>;

    /// Delete the credential only if it is still the one with `credential_id`.
    /// Returns `true` when a row was removed.
    async fn delete_credential(&self, identifier: &str, credential_id: Uuid) -> Result<bool>;

    async fn record_failed_attempt(
        &self,
        identifier: &str,
        credential_id: Uuid,
        max_attempts: i32,
    ) -> Result<AttemptOutcome>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn insert_account(&self, account: &Account) -> Result<InsertAccountOutcome>;

    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> Result<()>;
}

/// `OtpRepo` backed by Postgres (`sql/schema.sql`).
#[derive(Clone, Debug)]
pub struct PgOtpRepo {
    pool: PgPool,
}

impl PgOtpRepo {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl OtpRepo for PgOtpRepo {
    async fn find_credential(&self, identifier: &str) -> Result<Option<VerificationCredential>> {
        let query = r"
            SELECT id, identifier, code_hash, link_token_hash, expires_at, failed_attempts, created_at
            FROM verification_credentials
            WHERE identifier = $1
        ";
        sqlx::query_as::<_, VerificationCredential>(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup verification credential")
    }

    async fn upsert_credential(&self, credential: &VerificationCredential) -> Result<()> {
        // One statement so a concurrent verifier never observes a missing row.
        let query = r"
            INSERT INTO verification_credentials
                (id, identifier, code_hash, link_token_hash, expires_at, failed_attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            ON CONFLICT (identifier) DO UPDATE
            SET id = EXCLUDED.id,
                code_hash = EXCLUDED.code_hash,
                link_token_hash = EXCLUDED.link_token_hash,
                expires_at = EXCLUDED.expires_at,
                failed_attempts = 0,
                created_at = EXCLUDED.created_at
        ";
        sqlx::query(query)
            .bind(credential.id)
            .bind(&credential.identifier)
            .bind(&credential.code_hash)
            .bind(&credential.link_token_hash)
            .bind(credential.expires_at)
            .bind(credential.created_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to upsert verification credential")?;
        Ok(())
    }

    async fn delete_credential(&self, identifier: &str, credential_id: Uuid) -> Result<bool> {
        let query = r"
            DELETE FROM verification_credentials
            WHERE identifier = $1
              AND id = $2
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(identifier)
            .bind(credential_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to consume verification credential")?;
        Ok(row.is_some())
    }

    async fn record_failed_attempt(
        &self,
        identifier: &str,
        credential_id: Uuid,
        max_attempts: i32,
    ) -> Result<AttemptOutcome> {
        let query = r"
            UPDATE verification_credentials
            SET failed_attempts = failed_attempts + 1
            WHERE identifier = $1
              AND id = $2
            RETURNING failed_attempts
        ";
        let row = sqlx::query(query)
            .bind(identifier)
            .bind(credential_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to record verification attempt")?;

        let Some(row) = row else {
            return Ok(AttemptOutcome::Gone);
        };

        let failed_attempts: i32 = row.get("failed_attempts");
        if failed_attempts < max_attempts {
            return Ok(AttemptOutcome::Recorded { failed_attempts });
        }

        self.delete_credential(identifier, credential_id).await?;
        Ok(AttemptOutcome::Exhausted)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = r"
            SELECT id, email, status::text AS status, name, note, phone, created_at
            FROM accounts
            WHERE email = $1
        ";
        sqlx::query_as::<_, Account>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup account")
    }

    async fn insert_account(&self, account: &Account) -> Result<InsertAccountOutcome> {
        let query = r"
            INSERT INTO accounts
                (id, email, status, name, note, phone, created_at)
            VALUES ($1, $2, $3::account_status, $4, $5, $6, $7)
        ";
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(account.status.as_str())
            .bind(&account.name)
            .bind(&account.note)
            .bind(&account.phone)
            .bind(account.created_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(InsertAccountOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(InsertAccountOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert account"),
        }
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::models::AccountStatus;
    use chrono::{Duration, Utc};
    use sqlx::error::{DatabaseError, ErrorKind};
    use sqlx::postgres::PgPoolOptions;
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn schema_statements_are_rerunnable() {
        for line in SCHEMA_SQL.lines().map(str::trim_start) {
            if line.starts_with("CREATE TABLE") {
                assert!(line.starts_with("CREATE TABLE IF NOT EXISTS"), "{line}");
            }
            if line.starts_with("CREATE INDEX") {
                assert!(line.starts_with("CREATE INDEX IF NOT EXISTS"), "{line}");
            }
        }
        let type_at = SCHEMA_SQL.find("CREATE TYPE account_status").unwrap_or_default();
        let guard = &SCHEMA_SQL[..type_at];
        assert!(guard.trim_end().ends_with("BEGIN"));
        assert!(SCHEMA_SQL.contains("WHEN duplicate_object THEN NULL"));
    }

    /// Connect to `OTPGATE_TEST_DSN` and reset the schema; `None` skips the test.
    async fn test_repo() -> Result<Option<PgOtpRepo>> {
        let Ok(dsn) = std::env::var("OTPGATE_TEST_DSN") else {
            eprintln!("Skipping Postgres test: OTPGATE_TEST_DSN not set");
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;
        sqlx::raw_sql(
            "DROP TABLE IF EXISTS verification_credentials; \
             DROP TABLE IF EXISTS accounts; \
             DROP TYPE IF EXISTS account_status;",
        )
        .execute(&pool)
        .await?;
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(Some(PgOtpRepo::new(pool)))
    }

    fn credential(identifier: &str) -> VerificationCredential {
        let now = Utc::now();
        VerificationCredential {
            id: Uuid::now_v7(),
            identifier: identifier.to_string(),
            code_hash: "code-hash".to_string(),
            link_token_hash: "link-hash".to_string(),
            expires_at: now + Duration::minutes(15),
            failed_attempts: 0,
            created_at: now,
        }
    }

    // Both scenarios share one schema reset, so they run inside a single test.
    #[tokio::test]
    async fn pg_repo_scenarios() -> Result<()> {
        let Some(repo) = test_repo().await? else {
            return Ok(());
        };
        repo.ping().await?;
        // Applying the schema to an existing database is a no-op.
        sqlx::raw_sql(SCHEMA_SQL).execute(repo.pool()).await?;
        credential_lifecycle(&repo).await?;
        insert_account_reports_conflict(&repo).await
    }

    async fn credential_lifecycle(repo: &PgOtpRepo) -> Result<()> {
        let first = credential("pg@x.com");
        repo.upsert_credential(&first).await?;
        let second = credential("pg@x.com");
        repo.upsert_credential(&second).await?;

        let stored = repo
            .find_credential("pg@x.com")
            .await?
            .context("credential missing")?;
        assert_eq!(stored.id, second.id);

        // The replaced credential can no longer be consumed.
        assert!(!repo.delete_credential("pg@x.com", first.id).await?);

        assert_eq!(
            repo.record_failed_attempt("pg@x.com", second.id, 2).await?,
            AttemptOutcome::Recorded { failed_attempts: 1 }
        );
        assert_eq!(
            repo.record_failed_attempt("pg@x.com", second.id, 2).await?,
            AttemptOutcome::Exhausted
        );
        assert!(repo.find_credential("pg@x.com").await?.is_none());
        assert_eq!(
            repo.record_failed_attempt("pg@x.com", second.id, 2).await?,
            AttemptOutcome::Gone
        );
        Ok(())
    }

    async fn insert_account_reports_conflict(repo: &PgOtpRepo) -> Result<()> {
        let account = Account {
            id: Uuid::now_v7(),
            email: "dup@x.com".to_string(),
            status: AccountStatus::Pending,
            name: Some("Dup".to_string()),
            note: None,
            phone: None,
            created_at: Utc::now(),
        };
        assert_eq!(
            repo.insert_account(&account).await?,
            InsertAccountOutcome::Created
        );
        let again = Account {
            id: Uuid::now_v7(),
            ..account.clone()
        };
        assert_eq!(
            repo.insert_account(&again).await?,
            InsertAccountOutcome::Conflict
        );
        let stored = repo
            .find_account_by_email("dup@x.com")
            .await?
            .context("account missing")?;
        assert_eq!(stored.id, account.id);
        assert_eq!(stored.status, AccountStatus::Pending);
        Ok(())
    }
}
