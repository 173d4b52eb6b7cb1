//! Passwordless auth handlers.
//!
//! `POST /v1/auth/otp` issues a code, `POST|GET /v1/auth/otp/verify` verifies
//! a code or magic-link token and gates on the account status, and
//! `GET /v1/auth/session` introspects the session cookie minted on login.

pub(crate) mod issue;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;
pub(crate) mod verify;

pub use state::{AuthConfig, AuthDeps, AuthState};
