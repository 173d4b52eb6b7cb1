//! Passwordless verification core: issue a one-time code, verify it, then
//! gate access on the account's approval status.
//!
//! The three steps are independent services sharing an [`OtpRepo`] so the HTTP
//! layer can compose them per route and tests can drive each one directly.

pub mod crypto;
pub mod error;
pub mod gate;
pub mod identifier;
pub mod issuer;
pub mod memory;
pub mod models;
pub mod repo;
pub mod verifier;

pub use crypto::CredentialHasher;
pub use error::OtpError;
pub use gate::AccountGate;
pub use issuer::{IssuedCode, IssuerConfig, OtpIssuer};
pub use memory::MemoryOtpRepo;
pub use models::{
    AccessDecision, Account, AccountStatus, CodeIntent, NewAccountDefaults, SecretKind,
    VerificationCredential, VerificationOutcome,
};
pub use repo::{AttemptOutcome, InsertAccountOutcome, OtpRepo, PgOtpRepo};
pub use verifier::OtpVerifier;

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when advanced explicitly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(901));
        assert_eq!(clock.now(), start + Duration::seconds(901));
    }
}
