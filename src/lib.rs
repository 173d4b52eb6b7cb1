//! # Otpgate
//!
//! Passwordless login for a small internal application. A user asks for a
//! one-time code by email, proves possession of it (typed code or magic link)
//! and is then admitted according to the approval status of their account.
//!
//! ## Flow
//!
//! - **Issue:** a fresh numeric code and an independent link token are hashed
//!   with Argon2id and stored as the single live credential for the address.
//!   Reissuing replaces the previous credential.
//! - **Verify:** a presented secret is checked against the stored hash. A match
//!   consumes the credential atomically, so a code works exactly once. Wrong
//!   guesses are counted and the credential is revoked at the limit.
//! - **Gate:** first-time verifiers get a `pending` account and a welcome
//!   message. Only `approved` accounts receive a session token.
//!
//! Account approval itself happens out of band; this service never promotes an
//! account.

pub mod api;
pub mod cli;
pub mod notify;
pub mod otp;
pub mod session;

pub use api::{APP_USER_AGENT, GIT_COMMIT_HASH};
