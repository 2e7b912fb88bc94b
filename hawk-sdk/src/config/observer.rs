//! Shared secret guarding the observer and account endpoints.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};

/// An argon2 PHC string for the observer secret. The plaintext is never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSecret {
    phc: String,
}

impl ObserverSecret {
    /// Hash a plaintext secret with a fresh salt.
    pub fn hash(plaintext: &str) -> Result<Self, password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)?
            .to_string();
        Ok(Self { phc })
    }

    /// Wrap a PHC string that was hashed earlier, e.g. read back from the config file.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self { phc: phc.into() }
    }

    pub fn as_phc(&self) -> &str {
        &self.phc
    }

    /// Whether `candidate` is the secret. A malformed stored hash admits nobody.
    pub fn admits(&self, candidate: &str) -> bool {
        PasswordHash::new(&self.phc)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(candidate.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn looks_hashed(value: &str) -> bool {
        value.starts_with("$argon2")
    }
}
