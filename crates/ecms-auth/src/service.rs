//! Credential token service: issuance, validation and consumption of
//! single-use, time-boxed tokens for email verification and password
//! reset.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ecms_core::clock::Clock;
use ecms_core::error::{EcmsError, EcmsResult};
use ecms_core::models::credential_token::{CreateCredentialToken, CredentialToken, TokenKind};
use ecms_core::models::principal::Principal;
use ecms_core::notify::{Notifier, send_best_effort};
use ecms_core::repository::{CredentialTokenRepository, PrincipalRepository};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::password;
use crate::token;

/// Retries of an issuance that lost a race with another issuance for the
/// same principal and kind.
const MAX_ISSUE_RETRIES: u32 = 3;

/// How a token is delivered to its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueMode {
    /// The opaque token itself is sent, embedded in a link.
    Link,
    /// A six-digit code is sent; the opaque token stays server-side until
    /// the code is verified.
    Otp,
}

/// Result of a successful issuance. Holds secrets, so `Debug` redacts them.
#[derive(Clone)]
pub struct IssuedToken {
    pub token_id: Uuid,
    pub principal_id: Uuid,
    pub kind: TokenKind,
    /// Raw opaque token. Only its hash is stored.
    pub token: String,
    pub otp_code: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token_id", &self.token_id)
            .field("principal_id", &self.principal_id)
            .field("kind", &self.kind)
            .field("token", &"<redacted>")
            .field("otp_code", &self.otp_code.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What the holder presents back.
#[derive(Clone)]
pub enum TokenCredential {
    Link(String),
    Otp {
        email: String,
        kind: TokenKind,
        code: String,
    },
}

impl fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(_) => f.write_str("Link(<redacted>)"),
            Self::Otp { email, kind, .. } => f
                .debug_struct("Otp")
                .field("email", email)
                .field("kind", kind)
                .field("code", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct ValidatedToken {
    pub principal: Principal,
    pub token_id: Uuid,
    pub kind: TokenKind,
    /// Fresh opaque handle returned after a verified OTP code. It is the
    /// only way to consume the token afterwards.
    pub permit: Option<String>,
}

impl fmt::Debug for ValidatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedToken")
            .field("principal_id", &self.principal.id)
            .field("token_id", &self.token_id)
            .field("kind", &self.kind)
            .field("permit", &self.permit.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Credential token service.
///
/// Generic over repository implementations so that the auth layer
/// has no dependency on the database crate.
pub struct CredentialTokenService<P, T, N>
where
    P: PrincipalRepository,
    T: CredentialTokenRepository,
    N: Notifier,
{
    principals: P,
    tokens: T,
    notifier: N,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl<P, T, N> CredentialTokenService<P, T, N>
where
    P: PrincipalRepository,
    T: CredentialTokenRepository,
    N: Notifier,
{
    pub fn new(
        principals: P,
        tokens: T,
        notifier: N,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            principals,
            tokens,
            notifier,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issue a token, invalidating every earlier unused token of the same
    /// kind for this principal in the same transaction. Does not notify.
    pub async fn issue(
        &self,
        principal_id: Uuid,
        kind: TokenKind,
        mode: IssueMode,
        ttl: Duration,
    ) -> EcmsResult<IssuedToken> {
        // Surfaces NotFound for unknown principals before writing.
        self.principals.get_by_id(principal_id).await?;

        let raw = token::generate_opaque_token();
        let otp_code = match mode {
            IssueMode::Link => None,
            IssueMode::Otp => Some(token::generate_otp_code()),
        };
        let now = self.clock.now();

        let input = CreateCredentialToken {
            principal_id,
            kind,
            token_hash: token::hash_token(&raw),
            otp_code: otp_code.clone(),
            created_at: now,
            expires_at: now + ttl,
        };
        let mut attempt = 0;
        let stored = loop {
            match self.tokens.issue(input.clone()).await {
                Ok(stored) => break stored,
                Err(e) if e.is_retryable() && attempt < MAX_ISSUE_RETRIES => {
                    attempt += 1;
                    debug!(
                        principal_id = %principal_id,
                        kind = kind.as_str(),
                        attempt,
                        error = %e,
                        "Concurrent issuance, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            principal_id = %principal_id,
            token_id = %stored.id,
            kind = kind.as_str(),
            otp = otp_code.is_some(),
            "Credential token issued"
        );

        Ok(IssuedToken {
            token_id: stored.id,
            principal_id,
            kind,
            token: raw,
            otp_code,
            expires_at: stored.expires_at,
        })
    }

    /// Issue with the configured delivery mode and lifetime for `kind`,
    /// then notify the principal once the token is stored.
    pub async fn issue_token(
        &self,
        principal_id: Uuid,
        kind: TokenKind,
    ) -> EcmsResult<IssuedToken> {
        let (mode, ttl_secs) = match kind {
            TokenKind::EmailVerification => {
                (IssueMode::Link, self.config.email_verification_ttl_secs)
            }
            TokenKind::PasswordReset => (IssueMode::Otp, self.config.password_reset_otp_ttl_secs),
        };
        let issued = self
            .issue(principal_id, kind, mode, Duration::seconds(ttl_secs as i64))
            .await?;

        let principal = self.principals.get_by_id(principal_id).await?;
        let (subject, body) = match (&issued.otp_code, kind) {
            (Some(code), _) => (
                "Votre code de vérification",
                format!("Votre code est {code}. Il expire à {}.", issued.expires_at),
            ),
            (None, TokenKind::EmailVerification) => (
                "Confirmez votre adresse email",
                format!("Utilisez ce jeton pour confirmer votre adresse : {}", issued.token),
            ),
            (None, TokenKind::PasswordReset) => (
                "Réinitialisation de votre mot de passe",
                format!(
                    "Utilisez ce jeton pour réinitialiser votre mot de passe : {}",
                    issued.token
                ),
            ),
        };
        send_best_effort(&self.notifier, &principal.email, subject, &body).await;

        Ok(issued)
    }

    /// Check a presented credential.
    ///
    /// Failures are checked in order: missing (`NotFound`), already used
    /// (`AlreadyUsed`), past expiry (`Expired`). A link token is consumed
    /// on success. An OTP code is marked verified and exchanged for a
    /// fresh permit that must be passed to [`Self::consume`].
    pub async fn validate(&self, credential: TokenCredential) -> EcmsResult<ValidatedToken> {
        let result = match credential {
            TokenCredential::Link(raw) => self.validate_link(&raw).await,
            TokenCredential::Otp { email, kind, code } => {
                self.validate_otp(&email, kind, &code).await
            }
        };
        if let Err(e) = &result {
            info!(error = %e, "Credential rejected");
        }
        result
    }

    /// Façade over [`Self::validate`] returning only the principal.
    pub async fn validate_token(&self, credential: TokenCredential) -> EcmsResult<Principal> {
        self.validate(credential).await.map(|v| v.principal)
    }

    async fn validate_link(&self, raw: &str) -> EcmsResult<ValidatedToken> {
        let stored = self.tokens.get_by_token_hash(&token::hash_token(raw)).await?;
        // OTP tokens are only reachable through their code until verified.
        if stored.is_otp() {
            return Err(EcmsError::not_found("credential_token", stored.id));
        }
        self.check_usable(&stored)?;

        if !self.tokens.mark_used(stored.id).await? {
            return Err(EcmsError::AlreadyUsed);
        }
        let principal = self.principals.get_by_id(stored.principal_id).await?;
        debug!(principal_id = %principal.id, token_id = %stored.id, "Link token consumed");

        Ok(ValidatedToken {
            principal,
            token_id: stored.id,
            kind: stored.kind,
            permit: None,
        })
    }

    async fn validate_otp(
        &self,
        email: &str,
        kind: TokenKind,
        code: &str,
    ) -> EcmsResult<ValidatedToken> {
        let principal = self
            .principals
            .get_by_email(email)
            .await
            .map_err(|e| match e {
                EcmsError::NotFound { .. } => EcmsError::not_found("credential_token", "otp"),
                other => other,
            })?;

        let stored = self
            .tokens
            .find_otp(principal.id, kind, code)
            .await?
            .ok_or_else(|| EcmsError::not_found("credential_token", "otp"))?;
        if stored.verified {
            return Err(EcmsError::AlreadyUsed);
        }
        self.check_usable(&stored)?;

        let permit = token::generate_opaque_token();
        if !self
            .tokens
            .mark_verified(stored.id, &token::hash_token(&permit))
            .await?
        {
            return Err(EcmsError::AlreadyUsed);
        }
        debug!(principal_id = %principal.id, token_id = %stored.id, "OTP code verified");

        Ok(ValidatedToken {
            principal,
            token_id: stored.id,
            kind: stored.kind,
            permit: Some(permit),
        })
    }

    fn check_usable(&self, stored: &CredentialToken) -> EcmsResult<()> {
        if stored.used {
            return Err(EcmsError::AlreadyUsed);
        }
        if stored.is_expired_at(self.clock.now()) {
            return Err(EcmsError::Expired);
        }
        Ok(())
    }

    /// Mark a link token or a verified OTP permit as used. Exactly one of
    /// several concurrent calls succeeds; the others see `AlreadyUsed`.
    pub async fn consume(&self, raw: &str) -> EcmsResult<Principal> {
        let stored = self.redeemable(raw, None).await?;
        if !self.tokens.mark_used(stored.id).await? {
            return Err(EcmsError::AlreadyUsed);
        }
        let principal = self.principals.get_by_id(stored.principal_id).await?;
        debug!(principal_id = %principal.id, token_id = %stored.id, "Credential token consumed");
        Ok(principal)
    }

    /// Looks up a link token or OTP permit that may be spent now.
    async fn redeemable(
        &self,
        raw: &str,
        expected: Option<TokenKind>,
    ) -> EcmsResult<CredentialToken> {
        let stored = self.tokens.get_by_token_hash(&token::hash_token(raw)).await?;
        self.check_usable(&stored)?;
        if stored.is_otp() && !stored.verified {
            return Err(EcmsError::invalid_state(
                "credential_token",
                "code has not been verified",
            ));
        }
        if expected.is_some_and(|k| k != stored.kind) {
            return Err(EcmsError::not_found("credential_token", stored.id));
        }
        Ok(stored)
    }

    /// Confirm a principal's email address with a verification link.
    pub async fn confirm_email(&self, raw: &str) -> EcmsResult<Principal> {
        let validated = self.validate(TokenCredential::Link(raw.to_string())).await?;
        if validated.kind != TokenKind::EmailVerification {
            return Err(EcmsError::not_found("credential_token", validated.token_id));
        }
        let principal = self.principals.mark_email_verified(validated.principal.id).await?;
        info!(principal_id = %principal.id, "Email address confirmed");
        Ok(principal)
    }

    /// Start a password reset by sending a code to `email`.
    ///
    /// Unknown addresses succeed silently so the endpoint cannot be used
    /// to discover accounts.
    pub async fn request_password_reset(&self, email: &str) -> EcmsResult<()> {
        let principal = match self.principals.get_by_email(email).await {
            Ok(p) => p,
            Err(EcmsError::NotFound { .. }) => {
                debug!("Password reset requested for unknown address");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.issue_token(principal.id, TokenKind::PasswordReset).await?;
        Ok(())
    }

    /// Set a new password using the permit obtained from a verified
    /// password-reset code (or a password-reset link token).
    pub async fn reset_password(&self, permit: &str, new_password: &str) -> EcmsResult<Principal> {
        password::check_policy(new_password, self.config.min_password_length)?;
        let hash = password::hash_password(new_password, self.config.pepper.as_deref())?;

        let stored = self.redeemable(permit, Some(TokenKind::PasswordReset)).await?;
        if !self
            .tokens
            .redeem_password_reset(stored.id, stored.principal_id, &hash, self.clock.now())
            .await?
        {
            return Err(EcmsError::AlreadyUsed);
        }
        let updated = self.principals.get_by_id(stored.principal_id).await?;
        info!(principal_id = %updated.id, token_id = %stored.id, "Password reset");
        Ok(updated)
    }

    /// Delete tokens whose expiry has passed. Returns how many went.
    pub async fn purge_expired(&self) -> EcmsResult<u64> {
        let purged = self.tokens.delete_expired(self.clock.now()).await?;
        if purged > 0 {
            info!(purged, "Expired credential tokens purged");
        }
        Ok(purged)
    }
}
