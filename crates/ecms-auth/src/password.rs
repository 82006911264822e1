//! Password hashing and verification using Argon2id.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::AuthError;

/// Argon2id with the OWASP-recommended minimum parameters
/// (19 MiB memory, 2 iterations, 1 lane).
fn hasher() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(19_456, 2, 1, None)
        .map_err(|e| AuthError::Crypto(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn peppered(password: &str, pepper: Option<&str>) -> String {
    match pepper {
        Some(p) => format!("{p}{password}"),
        None => password.to_string(),
    }
}

/// Hash a plaintext password into a PHC-format string.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(peppered(password, pepper).as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Crypto(format!("hash error: {e}")))
}

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch, or
/// `Err(AuthError::Crypto)` if the stored hash is malformed.
pub fn verify_password(
    password: &str,
    hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    match hasher()?.verify_password(peppered(password, pepper).as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// Random alphanumeric password handed to a new administrator.
pub fn generate_temporary_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn check_policy(password: &str, min_length: usize) -> Result<(), AuthError> {
    if password.chars().count() < min_length {
        return Err(AuthError::PasswordTooShort { min: min_length });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let hash = hash_password("hunter2hunter2", None).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2hunter2", &hash, None).unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hash = hash_password("hunter2hunter2", None).unwrap();
        assert!(!verify_password("wrong", &hash, None).unwrap());
    }

    #[test]
    fn pepper_is_applied() {
        let hash = hash_password("hunter2", Some("pepper!")).unwrap();
        assert!(verify_password("hunter2", &hash, Some("pepper!")).unwrap());
        // Without pepper should fail.
        assert!(!verify_password("hunter2", &hash, None).unwrap());
    }

    #[test]
    fn malformed_hash_returns_error() {
        let result = verify_password("pw", "not-a-hash", None);
        assert!(result.is_err());
    }

    #[test]
    fn temporary_password_is_alphanumeric() {
        let pw = generate_temporary_password(12);
        assert_eq!(pw.len(), 12);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(pw, generate_temporary_password(12));
    }

    #[test]
    fn policy_enforces_minimum_length() {
        assert!(check_policy("short", 12).is_err());
        assert!(check_policy("long enough pw", 12).is_ok());
    }
}
