//! Auth configuration and the shared state injected into every handler.

use std::sync::Arc;
use url::Url;

use crate::notify::Notifier;
use crate::otp::{
    gate::DEFAULT_LOGIN_REDIRECT,
    issuer::{DEFAULT_CODE_DIGITS, DEFAULT_TTL_SECONDS},
    verifier::DEFAULT_MAX_ATTEMPTS,
    AccountGate, Clock, CredentialHasher, IssuerConfig, OtpIssuer, OtpRepo, OtpVerifier,
};
use crate::session::SessionTokens;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_base_url: Url,
    otp_ttl_seconds: i64,
    otp_digits: u32,
    otp_max_attempts: i32,
    login_redirect: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_base_url: Url) -> Self {
        Self {
            public_base_url,
            otp_ttl_seconds: DEFAULT_TTL_SECONDS,
            otp_digits: DEFAULT_CODE_DIGITS,
            otp_max_attempts: DEFAULT_MAX_ATTEMPTS,
            login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_digits(mut self, digits: u32) -> Self {
        self.otp_digits = digits;
        self
    }

    #[must_use]
    pub fn with_otp_max_attempts(mut self, attempts: i32) -> Self {
        self.otp_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, redirect: String) -> Self {
        self.login_redirect = redirect;
        self
    }

    #[must_use]
    pub fn public_base_url(&self) -> &Url {
        &self.public_base_url
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_digits(&self) -> u32 {
        self.otp_digits
    }

    #[must_use]
    pub fn otp_max_attempts(&self) -> i32 {
        self.otp_max_attempts
    }

    #[must_use]
    pub fn login_redirect(&self) -> &str {
        &self.login_redirect
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.public_base_url.scheme() == "https"
    }
}

/// Collaborators the auth state is assembled from.
pub struct AuthDeps {
    pub repo: Arc<dyn OtpRepo>,
    pub notifier: Arc<dyn Notifier>,
    pub hasher: Arc<CredentialHasher>,
    pub sessions: Arc<dyn SessionTokens>,
    pub clock: Arc<dyn Clock>,
}

pub struct AuthState {
    config: AuthConfig,
    repo: Arc<dyn OtpRepo>,
    issuer: OtpIssuer,
    verifier: OtpVerifier,
    gate: AccountGate,
    sessions: Arc<dyn SessionTokens>,
    clock: Arc<dyn Clock>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, deps: AuthDeps) -> Self {
        let AuthDeps {
            repo,
            notifier,
            hasher,
            sessions,
            clock,
        } = deps;

        let issuer_config = IssuerConfig::new(config.public_base_url.clone())
            .with_ttl_seconds(config.otp_ttl_seconds)
            .with_digits(config.otp_digits);
        let issuer = OtpIssuer::new(
            repo.clone(),
            notifier.clone(),
            hasher.clone(),
            clock.clone(),
            issuer_config,
        );
        let verifier = OtpVerifier::new(repo.clone(), hasher, clock.clone())
            .with_max_attempts(config.otp_max_attempts)
            .with_code_digits(config.otp_digits);
        let gate = AccountGate::new(repo.clone(), notifier, clock.clone())
            .with_redirect(config.login_redirect.clone());

        Self {
            config,
            repo,
            issuer,
            verifier,
            gate,
            sessions,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn repo(&self) -> &dyn OtpRepo {
        self.repo.as_ref()
    }

    pub(super) fn issuer(&self) -> &OtpIssuer {
        &self.issuer
    }

    pub(super) fn verifier(&self) -> &OtpVerifier {
        &self.verifier
    }

    pub(super) fn gate(&self) -> &AccountGate {
        &self.gate
    }

    pub(super) fn sessions(&self) -> &dyn SessionTokens {
        self.sessions.as_ref()
    }

    pub(super) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
