//! Single-use, time-boxed credential tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "EmailVerification",
            Self::PasswordReset => "PasswordReset",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialToken {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub kind: TokenKind,
    /// SHA-256 (hex) of the opaque token handed to the principal.
    pub token_hash: String,
    /// Six-digit code for OTP issuance, `None` for link tokens.
    pub otp_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    /// Set when an OTP code was checked; consumption happens later.
    pub verified: bool,
}

impl CredentialToken {
    /// Expiry is strict: a token is still valid at exactly `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_otp(&self) -> bool {
        self.otp_code.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredentialToken {
    pub principal_id: Uuid,
    pub kind: TokenKind,
    pub token_hash: String,
    pub otp_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
