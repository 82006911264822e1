//! E-CMS Auth: Argon2id password hashing and single-use credential
//! tokens for email verification and password reset.

pub mod config;
pub mod error;
pub mod password;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::{AuthError, INVALID_OR_EXPIRED_CODE, public_message};
pub use service::{CredentialTokenService, IssueMode, IssuedToken, TokenCredential, ValidatedToken};
