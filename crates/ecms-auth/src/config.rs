//! Credential configuration.

/// Configuration for password hashing and credential tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Optional pepper prepended to passwords before Argon2id hashing
    /// and verification.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Email verification link lifetime (default: 86_400 = 24 hours).
    pub email_verification_ttl_secs: u64,
    /// Password reset code lifetime (default: 600 = 10 minutes).
    pub password_reset_otp_ttl_secs: u64,
    /// Password reset link lifetime, for link-based resets
    /// (default: 3_600 = 1 hour).
    pub password_reset_link_ttl_secs: u64,
    /// Length of generated temporary passwords.
    pub temporary_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pepper: None,
            min_password_length: 12,
            email_verification_ttl_secs: 86_400,
            password_reset_otp_ttl_secs: 600,
            password_reset_link_ttl_secs: 3_600,
            temporary_password_length: 12,
        }
    }
}
