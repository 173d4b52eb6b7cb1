//! Code/token generation and Argon2id hashing for verification credentials.
//!
//! Codes and link tokens are hashed independently with a fresh salt each, and
//! optionally with a server-side pepper. Only the PHC strings are persisted.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, Rng, RngCore};
use secrecy::{ExposeSecret, SecretBox};

pub const MIN_CODE_DIGITS: u32 = 6;
pub const MAX_CODE_DIGITS: u32 = 9;
const LINK_TOKEN_BYTES: usize = 32;

/// Generate a uniformly random numeric code with exactly `digits` digits.
///
/// # Errors
/// Returns an error if `digits` is outside `MIN_CODE_DIGITS..=MAX_CODE_DIGITS`.
pub fn generate_code(digits: u32) -> Result<String> {
    generate_code_with_rng(&mut OsRng, digits)
}

fn generate_code_with_rng<R: Rng>(rng: &mut R, digits: u32) -> Result<String> {
    if !(MIN_CODE_DIGITS..=MAX_CODE_DIGITS).contains(&digits) {
        return Err(anyhow!(
            "code length must be between {MIN_CODE_DIGITS} and {MAX_CODE_DIGITS} digits"
        ));
    }
    let low = 10u32.pow(digits - 1);
    let high = 10u32.pow(digits);
    Ok(rng.gen_range(low..high).to_string())
}

/// Create a random opaque token for magic links. Shares no material with the code.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate_link_token() -> Result<String> {
    let mut bytes = [0u8; LINK_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate link token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Check that a presented code has the expected shape before any hashing work.
#[must_use]
pub fn well_formed_code(code: &str, digits: u32) -> bool {
    code.len() == digits as usize && code.bytes().all(|b| b.is_ascii_digit())
}

/// Argon2id hasher for codes and link tokens.
pub struct CredentialHasher {
    params: Params,
    pepper: Option<SecretBox<Vec<u8>>>,
    // Hash of a random value, verified against when no credential exists so
    // "not found" costs the same as "invalid".
    dummy_hash: String,
}

impl CredentialHasher {
    /// Hasher with Argon2 default parameters.
    ///
    /// # Errors
    /// Returns an error if the pepper is rejected by Argon2 or hashing fails.
    pub fn new(pepper: Option<Vec<u8>>) -> Result<Self> {
        Self::with_params(Params::default(), pepper)
    }

    /// Hasher with explicit memory (KiB) and iteration costs.
    ///
    /// # Errors
    /// Returns an error if the parameters or the pepper are invalid.
    pub fn with_costs(m_cost_kib: u32, t_cost: u32, pepper: Option<Vec<u8>>) -> Result<Self> {
        let params = Params::new(m_cost_kib, t_cost, 1, None)
            .map_err(|_| anyhow!("invalid Argon2 parameters"))?;
        Self::with_params(params, pepper)
    }

    fn with_params(params: Params, pepper: Option<Vec<u8>>) -> Result<Self> {
        let pepper = pepper
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| SecretBox::new(Box::new(bytes)));
        let mut hasher = Self {
            params,
            pepper,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(&generate_link_token()?)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Result<Argon2<'_>> {
        match &self.pepper {
            Some(pepper) => Argon2::new_with_secret(
                pepper.expose_secret(),
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            )
            .map_err(|_| anyhow!("failed to initialize Argon2id")),
            None => Ok(Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            )),
        }
    }

    /// Hash a secret with a fresh random salt and return the PHC string.
    ///
    /// # Errors
    /// Returns an error if Argon2 fails.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|_| anyhow!("failed to hash credential"))?
            .to_string();
        Ok(hash)
    }

    /// Verify a secret against a stored PHC string using Argon2's constant-time comparison.
    ///
    /// # Errors
    /// Returns an error if the stored hash cannot be parsed.
    pub fn verify(&self, secret: &str, stored_hash: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid credential hash"))?;
        Ok(self
            .argon2()?
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok())
    }

    /// Spend one verification worth of work without a stored credential.
    pub fn verify_dummy(&self, secret: &str) {
        let _ = self.verify(secret, &self.dummy_hash);
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", &self.params)
            .field("pepper", &self.pepper.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fast_hasher(pepper: Option<Vec<u8>>) -> CredentialHasher {
        CredentialHasher::with_costs(1024, 1, pepper).unwrap()
    }

    #[test]
    fn generate_code_has_requested_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for digits in MIN_CODE_DIGITS..=MAX_CODE_DIGITS {
            for _ in 0..50 {
                let code = generate_code_with_rng(&mut rng, digits).unwrap();
                assert!(well_formed_code(&code, digits), "bad code {code}");
                assert_ne!(code.as_bytes()[0], b'0');
            }
        }
    }

    #[test]
    fn generate_code_rejects_short_codes() {
        assert!(generate_code(4).is_err());
        assert!(generate_code(10).is_err());
    }

    #[test]
    fn link_token_decodes_to_32_bytes() {
        let token = generate_link_token().unwrap();
        let decoded = Base64UrlUnpadded::decode_vec(&token).unwrap();
        assert_eq!(decoded.len(), LINK_TOKEN_BYTES);
        assert_ne!(token, generate_link_token().unwrap());
    }

    #[test]
    fn well_formed_code_rejects_other_shapes() {
        assert!(well_formed_code("123456", 6));
        assert!(!well_formed_code("12345", 6));
        assert!(!well_formed_code("12a456", 6));
        assert!(!well_formed_code(" 123456", 6));
    }

    #[test]
    fn hash_is_salted_and_verifies() {
        let hasher = fast_hasher(None);
        let first = hasher.hash("482913").unwrap();
        let second = hasher.hash("482913").unwrap();
        assert_ne!(first, second);
        assert!(!first.contains("482913"));
        assert!(hasher.verify("482913", &first).unwrap());
        assert!(hasher.verify("482913", &second).unwrap());
        assert!(!hasher.verify("482914", &first).unwrap());
    }

    #[test]
    fn pepper_must_match() {
        let peppered = fast_hasher(Some(b"pepper".to_vec()));
        let other = fast_hasher(Some(b"other".to_vec()));
        let hash = peppered.hash("123456").unwrap();
        assert!(peppered.verify("123456", &hash).unwrap());
        assert!(!other.verify("123456", &hash).unwrap());
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        let hasher = fast_hasher(None);
        assert!(hasher.verify("123456", "not-a-phc-string").is_err());
    }

    #[test]
    fn debug_redacts_pepper() {
        let hasher = fast_hasher(Some(b"s3cr3t-pepper".to_vec()));
        let rendered = format!("{hasher:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("***"));
    }
}
