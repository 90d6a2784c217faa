//! PIN hashing. Stored credentials are Argon2id PHC strings; plaintext
//! values written before hashing was introduced are still accepted once
//! and flagged for rehashing.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

use super::AppError;

const PHC_PREFIX: &str = "$argon2";

/// Outcome of checking a PIN against a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    /// Correct PIN, but the stored value is legacy plaintext.
    MatchNeedsRehash,
    Mismatch,
}

impl Verification {
    pub fn is_match(self) -> bool {
        !matches!(self, Verification::Mismatch)
    }
}

/// Hash a PIN using Argon2id with a random salt.
pub fn hash_pin(pin: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Credential(e.to_string()))
}

pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with(PHC_PREFIX)
}

/// Verify a PIN against a stored credential.
pub fn verify_pin(pin: &str, stored: &str) -> Verification {
    if !is_hashed(stored) {
        return if constant_time_eq(pin.as_bytes(), stored.as_bytes()) {
            Verification::MatchNeedsRehash
        } else {
            Verification::Mismatch
        };
    }

    let Ok(parsed) = PasswordHash::new(stored) else {
        return Verification::Mismatch;
    };
    match Argon2::default().verify_password(pin.as_bytes(), &parsed) {
        Ok(()) => Verification::Match,
        Err(_) => Verification::Mismatch,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_pin("1234").unwrap();
        assert!(is_hashed(&hash));
        assert!(!hash.contains('|'));
        assert_eq!(verify_pin("1234", &hash), Verification::Match);
        assert_eq!(verify_pin("9999", &hash), Verification::Mismatch);
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_pin("1234").unwrap(), hash_pin("1234").unwrap());
    }

    #[test]
    fn test_legacy_plaintext() {
        assert_eq!(verify_pin("1234", "1234"), Verification::MatchNeedsRehash);
        assert_eq!(verify_pin("123", "1234"), Verification::Mismatch);
        assert!(verify_pin("1234", "1234").is_match());
    }

    #[test]
    fn test_corrupt_hash_never_matches() {
        assert_eq!(verify_pin("1234", "$argon2id$garbage"), Verification::Mismatch);
    }
}
