//! Session tokens handed out after an approved login.
//!
//! Tokens are PASETO `v4.local` (encrypted and authenticated with a 32-byte
//! symmetric key). The payload is our own JSON claims; expiry is validated
//! here rather than by the library so the clock can be injected.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Duration, Utc};
use pasetors::keys::{Generate, SymmetricKey};
use pasetors::token::UntrustedToken;
use pasetors::version4::{LocalToken, V4};
use pasetors::Local;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::otp::{Account, Clock};

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 43_200;
pub const MAX_SESSION_TTL_SECONDS: i64 = 2_592_000;
pub const SESSION_COOKIE: &str = "otpgate_session";
const SESSION_KEY_BYTES: usize = 32;
// Binds tokens to this purpose; a v4.local token minted elsewhere with the same key fails.
const IMPLICIT_ASSERTION: &[u8] = b"otpgate.session.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionClaims {
    /// Account id.
    pub sub: Uuid,
    pub email: String,
    pub iat: DateTime<Utc>,
    pub exp: DateTime<Utc>,
}

impl SessionClaims {
    /// # Errors
    /// Returns an error if `now + ttl` is not a representable timestamp.
    pub fn for_account(account: &Account, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow!("session expiry is out of range"))?;
        Ok(Self {
            sub: account.id,
            email: account.email.clone(),
            iat: now,
            exp,
        })
    }
}

pub trait SessionTokens: Send + Sync {
    /// Mint a token carrying `claims`.
    ///
    /// # Errors
    /// Returns an error if serialization or encryption fails.
    fn issue(&self, claims: &SessionClaims) -> Result<String>;

    /// Decrypt and validate a token, including expiry.
    ///
    /// # Errors
    /// Returns an error for malformed, tampered, foreign or expired tokens.
    fn verify(&self, token: &str) -> Result<SessionClaims>;

    /// Lifetime applied to newly issued sessions.
    fn ttl(&self) -> Duration;
}

pub struct PasetoSessionTokens {
    key: SymmetricKey<V4>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PasetoSessionTokens {
    /// Build from a base64-encoded 32-byte key, or generate an ephemeral key
    /// when none is configured (sessions then do not survive a restart).
    ///
    /// # Errors
    /// Returns an error if the key is not valid base64 or not 32 bytes long,
    /// or if `ttl` is outside `1..=MAX_SESSION_TTL_SECONDS` seconds.
    pub fn new(key: Option<&SecretString>, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if ttl < Duration::seconds(1) || ttl > Duration::seconds(MAX_SESSION_TTL_SECONDS) {
            return Err(anyhow!(
                "session ttl must be between 1 and {MAX_SESSION_TTL_SECONDS} seconds"
            ));
        }
        let key = match key {
            Some(encoded) => {
                let bytes = Base64::decode_vec(encoded.expose_secret().trim())
                    .map_err(|_| anyhow!("session key must be base64"))?;
                if bytes.len() != SESSION_KEY_BYTES {
                    return Err(anyhow!(
                        "session key must decode to {SESSION_KEY_BYTES} bytes, got {}",
                        bytes.len()
                    ));
                }
                SymmetricKey::<V4>::from(&bytes).map_err(|err| anyhow!("invalid session key: {err:?}"))?
            }
            None => SymmetricKey::<V4>::generate()
                .map_err(|err| anyhow!("failed to generate session key: {err:?}"))?,
        };
        Ok(Self { key, ttl, clock })
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        let untrusted = UntrustedToken::<Local, V4>::try_from(token)
            .map_err(|err| anyhow!("malformed session token: {err:?}"))?;
        let trusted = LocalToken::decrypt(&self.key, &untrusted, None, Some(IMPLICIT_ASSERTION))
            .map_err(|err| anyhow!("session token rejected: {err:?}"))?;
        let claims: SessionClaims =
            serde_json::from_str(trusted.payload()).context("invalid session claims")?;
        if claims.exp <= now {
            return Err(anyhow!("session token expired"));
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for PasetoSessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasetoSessionTokens")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionTokens for PasetoSessionTokens {
    fn issue(&self, claims: &SessionClaims) -> Result<String> {
        let payload = serde_json::to_vec(claims).context("failed to encode session claims")?;
        LocalToken::encrypt(&self.key, &payload, None, Some(IMPLICIT_ASSERTION))
            .map_err(|err| anyhow!("failed to encrypt session token: {err:?}"))
    }

    fn verify(&self, token: &str) -> Result<SessionClaims> {
        self.verify_at(token, self.clock.now())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
