//! SurrealDB implementation of [`CredentialTokenRepository`].

use chrono::{DateTime, Utc};
use ecms_core::error::EcmsResult;
use ecms_core::models::credential_token::{CreateCredentialToken, CredentialToken, TokenKind};
use ecms_core::repository::CredentialTokenRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::transaction_failure;
use crate::error::{DbError, PRINCIPAL_MISSING_MARKER, TOKEN_SPENT_MARKER, decode_uuid};

#[derive(Debug, SurrealValue)]
struct CredentialTokenRowWithId {
    record_id: String,
    principal_id: String,
    kind: String,
    token_hash: String,
    otp_code: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used: bool,
    verified: bool,
}

impl CredentialTokenRowWithId {
    fn try_into_token(self) -> Result<CredentialToken, DbError> {
        Ok(CredentialToken {
            id: decode_uuid(&self.record_id, "credential token")?,
            principal_id: decode_uuid(&self.principal_id, "principal")?,
            kind: parse_kind(&self.kind)?,
            token_hash: self.token_hash,
            otp_code: self.otp_code,
            created_at: self.created_at,
            expires_at: self.expires_at,
            used: self.used,
            verified: self.verified,
        })
    }
}

/// Only the record key is needed to count affected rows.
#[derive(Debug, SurrealValue)]
struct AffectedRow {
    #[allow(dead_code)]
    record_id: String,
}

/// Projection of a deleted row, used only for counting.
#[derive(Debug, SurrealValue)]
struct PurgedRow {
    #[allow(dead_code)]
    principal_id: String,
}

fn parse_kind(s: &str) -> Result<TokenKind, DbError> {
    match s {
        "EmailVerification" => Ok(TokenKind::EmailVerification),
        "PasswordReset" => Ok(TokenKind::PasswordReset),
        other => Err(DbError::Decode(format!("unknown token kind: {other}"))),
    }
}

#[derive(Clone)]
pub struct SurrealCredentialTokenRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCredentialTokenRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn get_by_id(&self, id: &str) -> EcmsResult<CredentialToken> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('credential_token', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialTokenRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "credential_token".into(),
            id: id.to_string(),
        })?;

        Ok(row.try_into_token()?)
    }
}

impl<C: Connection> CredentialTokenRepository for SurrealCredentialTokenRepository<C> {
    async fn issue(&self, input: CreateCredentialToken) -> EcmsResult<CredentialToken> {
        let id_str = Uuid::new_v4().to_string();
        let slot = format!("{}:{}", input.principal_id, input.kind.as_str());

        // Every issuance rewrites the same slot row, so two transactions
        // for one (principal, kind) cannot both commit.
        let mut response = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 UPSERT type::record('credential_token_slot', $slot) SET \
                 token_id = $id, issued_at = $created_at; \
                 UPDATE credential_token SET used = true \
                 WHERE principal_id = $principal_id \
                 AND kind = $kind AND used = false; \
                 CREATE type::record('credential_token', $id) SET \
                 principal_id = $principal_id, \
                 kind = $kind, \
                 token_hash = $token_hash, \
                 otp_code = $otp_code, \
                 created_at = $created_at, \
                 expires_at = $expires_at, \
                 used = false, \
                 verified = false; \
                 COMMIT TRANSACTION;",
            )
            .bind(("slot", slot))
            .bind(("id", id_str.clone()))
            .bind(("principal_id", input.principal_id.to_string()))
            .bind(("kind", input.kind.as_str().to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("otp_code", input.otp_code))
            .bind(("created_at", input.created_at))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(transaction_failure(errors).into());
        }

        debug!(
            principal_id = %input.principal_id,
            kind = input.kind.as_str(),
            "Issued credential token, prior tokens invalidated"
        );

        self.get_by_id(&id_str).await
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> EcmsResult<CredentialToken> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM credential_token \
                 WHERE token_hash = $token_hash LIMIT 1",
            )
            .bind(("token_hash", token_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialTokenRowWithId> = result.take(0).map_err(DbError::from)?;
        // The hash itself is a credential, so it never goes into the error.
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "credential_token".into(),
            id: "<redacted>".into(),
        })?;

        Ok(row.try_into_token()?)
    }

    async fn find_otp(
        &self,
        principal_id: Uuid,
        kind: TokenKind,
        code: &str,
    ) -> EcmsResult<Option<CredentialToken>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM credential_token \
                 WHERE principal_id = $principal_id \
                 AND kind = $kind AND otp_code = $code \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("principal_id", principal_id.to_string()))
            .bind(("kind", kind.as_str().to_string()))
            .bind(("code", code.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialTokenRowWithId> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_token()?)),
            None => Ok(None),
        }
    }

    async fn mark_used(&self, id: Uuid) -> EcmsResult<bool> {
        let result = self
            .db
            .query(
                "UPDATE type::record('credential_token', $id) \
                 SET used = true WHERE used = false \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<AffectedRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn mark_verified(&self, id: Uuid, new_token_hash: &str) -> EcmsResult<bool> {
        let result = self
            .db
            .query(
                "UPDATE type::record('credential_token', $id) \
                 SET verified = true, token_hash = $token_hash \
                 WHERE used = false AND verified = false \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("token_hash", new_token_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<AffectedRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn redeem_password_reset(
        &self,
        id: Uuid,
        principal_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> EcmsResult<bool> {
        let mut response = self
            .db
            .query(format!(
                "BEGIN TRANSACTION;
LET $spent = (UPDATE type::record('credential_token', $id)
    SET used = true WHERE used = false
    RETURN meta::id(id) AS record_id);
IF array::len($spent) == 0 {{ THROW '{TOKEN_SPENT_MARKER}'; }};
LET $updated = (UPDATE type::record('principal', $principal_id)
    SET password_hash = $password_hash, updated_at = $now
    RETURN meta::id(id) AS record_id);
IF array::len($updated) == 0 {{ THROW '{PRINCIPAL_MISSING_MARKER}'; }};
COMMIT TRANSACTION;"
            ))
            .bind(("id", id.to_string()))
            .bind(("principal_id", principal_id.to_string()))
            .bind(("password_hash", password_hash.to_string()))
            .bind(("now", now))
            .await
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let errors = response.take_errors();
        if errors.is_empty() {
            return Ok(true);
        }
        match transaction_failure(errors) {
            DbError::Transaction(message) if message.contains(TOKEN_SPENT_MARKER) => Ok(false),
            DbError::Transaction(message) if message.contains(PRINCIPAL_MISSING_MARKER) => {
                Err(DbError::NotFound {
                    entity: "principal".into(),
                    id: principal_id.to_string(),
                }
                .into())
            }
            err => Err(err.into()),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> EcmsResult<u64> {
        let result = self
            .db
            .query(
                "DELETE credential_token WHERE expires_at < $now \
                 RETURN BEFORE",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<PurgedRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }
}
