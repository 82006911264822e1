//! Credential error types.

use ecms_core::error::EcmsError;
use thiserror::Error;

/// The only message shown to end users for a rejected code or link.
pub const INVALID_OR_EXPIRED_CODE: &str = "invalid or expired code";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for EcmsError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::PasswordTooShort { .. } => EcmsError::Validation {
                message: err.to_string(),
            },
            AuthError::Crypto(msg) => EcmsError::Crypto(msg),
        }
    }
}

/// User-facing message for a token failure.
///
/// Not-found, expired and already-used tokens all read the same so a
/// caller cannot probe which codes exist. Callers log the precise
/// variant separately.
pub fn public_message(err: &EcmsError) -> String {
    match err {
        EcmsError::NotFound { .. }
        | EcmsError::Expired
        | EcmsError::AlreadyUsed
        | EcmsError::InvalidState { .. } => INVALID_OR_EXPIRED_CODE.into(),
        other => other.to_string(),
    }
}
