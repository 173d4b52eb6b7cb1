use thiserror::Error;

use super::models::AccountStatus;

/// Failures surfaced by the issuer, verifier and gate.
///
/// Display strings are for logs; clients only ever see [`OtpError::public_message`].
#[derive(Debug, Error)]
pub enum OtpError {
    #[error("validation failed: {0}")]
    Validation(&'static str),
    #[error("verification credential not found")]
    NotFound,
    #[error("verification credential expired")]
    Expired,
    #[error("verification credential mismatch")]
    Invalid,
    #[error("access denied for {} account", .0.as_str())]
    AccessDenied(AccountStatus),
    #[error("notification dispatch failed: {0:#}")]
    Dispatch(anyhow::Error),
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl OtpError {
    /// Stable machine-readable kind. `NotFound` and `Invalid` share a kind so a
    /// client cannot probe which identifiers hold a credential.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound | Self::Invalid => "invalid_code",
            Self::Expired => "expired_code",
            Self::AccessDenied(_) => "access_denied",
            Self::Dispatch(_) => "dispatch_failure",
            Self::Storage(_) => "storage_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(message) => *message,
            Self::NotFound | Self::Invalid => "The code is invalid. Request a new one and try again.",
            Self::Expired => "The code has expired. Request a new one and try again.",
            Self::AccessDenied(AccountStatus::Suspended) => "Your account has been suspended.",
            Self::AccessDenied(_) => "Your account is awaiting approval.",
            Self::Dispatch(_) => "We could not send your code. Please try again later.",
            Self::Storage(_) | Self::Internal(_) => "Something went wrong. Please try again later.",
        }
    }

    /// True for failures caused by infrastructure rather than the caller.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Dispatch(_) | Self::Storage(_) | Self::Internal(_))
    }
}
