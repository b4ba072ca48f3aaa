use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use subtle::ConstantTimeEq;

/// Memory cost in KiB (64 MiB).
pub const MEMORY_COST_KIB: u32 = 64 * 1024;
pub const TIME_COST: u32 = 1;
pub const PARALLELISM: u32 = 4;
pub const OUTPUT_LEN: usize = 32;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for an encoded (PHC string) password hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Peppered Argon2id hasher.
///
/// The pepper is appended to the password before derivation and never stored.
#[derive(Clone)]
pub struct CredentialHasher {
    pepper: Secret<String>,
    params: Params,
}

impl CredentialHasher {
    pub fn new(pepper: Secret<String>) -> Result<Self, anyhow::Error> {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Self { pepper, params })
    }

    fn peppered(&self, password: &Password) -> Vec<u8> {
        let mut input = Vec::with_capacity(password.as_str().len() + self.pepper.expose_secret().len());
        input.extend_from_slice(password.as_str().as_bytes());
        input.extend_from_slice(self.pepper.expose_secret().as_bytes());
        input
    }

    /// Hash a password with a fresh 16-byte salt.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = argon2
            .hash_password(&self.peppered(password), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// Verify a password against an encoded hash.
    ///
    /// Returns `Ok(false)` for a mismatch or for any encoding that is not an
    /// Argon2id v0x13 PHC string. `Err` only when derivation itself fails.
    pub fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let Ok(parsed) = PasswordHash::new(password_hash.as_str()) else {
            return Ok(false);
        };

        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return Ok(false);
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return Ok(false);
        }
        let Ok(params) = Params::try_from(&parsed) else {
            return Ok(false);
        };
        let (Some(salt), Some(expected)) = (parsed.salt, parsed.hash) else {
            return Ok(false);
        };

        let mut salt_buf = [0u8; 64];
        let Ok(salt) = salt.decode_b64(&mut salt_buf) else {
            return Ok(false);
        };
        if salt.len() < argon2::MIN_SALT_LEN || expected.len() < Params::MIN_OUTPUT_LEN {
            return Ok(false);
        }

        let mut derived = vec![0u8; expected.len()];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(&self.peppered(password), salt, &mut derived)
            .map_err(|e| anyhow::anyhow!("Password derivation failed: {}", e))?;

        Ok(derived.ct_eq(expected.as_bytes()).into())
    }

    /// [`Self::hash`] on the blocking pool.
    pub async fn hash_blocking(
        &self,
        password: Password,
    ) -> Result<PasswordHashString, anyhow::Error> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| anyhow::anyhow!("Hashing task failed: {}", e))?
    }

    /// [`Self::verify`] on the blocking pool.
    pub async fn verify_blocking(
        &self,
        password: Password,
        password_hash: PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .map_err(|e| anyhow::anyhow!("Verification task failed: {}", e))?
    }
}
