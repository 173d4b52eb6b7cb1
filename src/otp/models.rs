use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

/// Hashed one-time code and magic-link token issued to a single identifier.
#[derive(Debug, Clone)]
pub struct VerificationCredential {
    pub id: Uuid,
    pub identifier: String,
    pub code_hash: String,
    pub link_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub failed_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl VerificationCredential {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl<'r> FromRow<'r, PgRow> for VerificationCredential {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            identifier: row.try_get("identifier")?,
            code_hash: row.try_get("code_hash")?,
            link_token_hash: row.try_get("link_token_hash")?,
            expires_at: row.try_get("expires_at")?,
            failed_attempts: row.try_get("failed_attempts")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Account approval state. Only `Pending` is ever written by this service;
/// the other transitions belong to administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Suspended,
}

impl AccountStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Suspended => "suspended",
        }
    }

    /// Parse the persisted `accounts.status` textual value into a typed enum.
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "suspended" => Ok(Self::Suspended),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid accounts.status value: {value}"),
            )))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub status: AccountStatus,
    pub name: Option<String>,
    pub note: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            status: AccountStatus::from_db(&status)?,
            name: row.try_get("name")?,
            note: row.try_get("note")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Profile fields supplied by the client and stored only when the account is created.
#[derive(Debug, Clone, Default)]
pub struct NewAccountDefaults {
    pub name: Option<String>,
    pub note: Option<String>,
    pub phone: Option<String>,
}

/// Which stored hash a presented secret is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Code,
    LinkToken,
}

/// Result of checking a presented secret against the stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    NotFound,
    Expired,
    Invalid,
}

/// What the caller is allowed to do after a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    PendingApprovalNewAccount { account_id: Uuid },
    PendingApproval { account_id: Uuid },
    Suspended { account_id: Uuid },
    LoggedIn { account: Account, redirect_to: String },
}

/// Message wording requested by the client when asking for a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeIntent {
    Login,
    Register,
}

impl CodeIntent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
        }
    }
}
