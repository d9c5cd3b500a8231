use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

use crate::config::Config;
use crate::error::AppError;

/// Password policy and argon2 hashing for courier credentials.
#[derive(Clone)]
pub struct Credentials {
    hasher: Argon2<'static>,
    min_length: usize,
}

impl Credentials {
    pub fn new(memory_kib: u32, iterations: u32, min_length: usize) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|err| AppError::Internal(format!("invalid argon2 params: {err}")))?;

        Ok(Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            min_length,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.password_hash_memory_kib,
            config.password_hash_iterations,
            config.min_password_length,
        )
    }

    pub fn check_length(&self, password: &str) -> Result<(), AppError> {
        if password.chars().count() < self.min_length {
            return Err(AppError::PasswordTooShort {
                min: self.min_length,
            });
        }
        Ok(())
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        self.check_length(password)?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| AppError::Internal(format!("failed to hash password: {err}")))?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Credentials;
    use crate::error::AppError;

    fn credentials() -> Credentials {
        Credentials::new(8, 1, 4).unwrap()
    }

    #[test]
    fn hash_verifies_only_the_hashed_password() {
        let credentials = credentials();
        let hash = credentials.hash("s3cret").unwrap();

        assert_ne!(hash, "s3cret");
        assert!(credentials.verify("s3cret", &hash));
        assert!(!credentials.verify("s3cre", &hash));
    }

    #[test]
    fn short_password_is_rejected_before_hashing() {
        assert!(matches!(
            credentials().hash("abc"),
            Err(AppError::PasswordTooShort { min: 4 })
        ));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!credentials().verify("anything", "not-a-phc-string"));
    }
}
