//! Opaque credential tokens and one-time codes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a cryptographically random opaque token
/// (32 bytes → base64url-encoded, no padding).
pub fn generate_opaque_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash of a raw token, hex-encoded.
///
/// This is the value stored in the database as
/// `credential_token.token_hash`; the raw token is never persisted.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Six decimal digits, zero-padded.
pub fn generate_otp_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_token_is_url_safe() {
        let token = generate_opaque_token();
        // base64url characters only (A-Z a-z 0-9 - _), no padding.
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        // 32 bytes → 43 base64url chars.
        assert_eq!(token.len(), 43);
    }

    #[test]
    fn opaque_tokens_are_unique() {
        assert_ne!(generate_opaque_token(), generate_opaque_token());
    }

    #[test]
    fn token_hash_is_deterministic() {
        let raw = "some-opaque-token";
        assert_eq!(hash_token(raw), hash_token(raw));
        assert_eq!(hash_token(raw).len(), 64);
        assert_ne!(hash_token(raw), hash_token("other"));
    }

    #[test]
    fn otp_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
