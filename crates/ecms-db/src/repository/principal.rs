//! SurrealDB implementation of [`PrincipalRepository`].

use chrono::{DateTime, Utc};
use ecms_core::error::{EcmsError, EcmsResult};
use ecms_core::models::principal::{CreatePrincipal, Principal, PrincipalRole};
use ecms_core::repository::{PrincipalRepository, Upserted};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, decode_uuid};

#[derive(Debug, SurrealValue)]
pub(crate) struct PrincipalRowWithId {
    record_id: String,
    email: String,
    full_name: String,
    password_hash: String,
    role: String,
    tenant_id: Option<String>,
    is_active: bool,
    email_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PrincipalRowWithId {
    pub(crate) fn try_into_principal(self) -> Result<Principal, DbError> {
        let tenant_id = self
            .tenant_id
            .as_deref()
            .map(|t| decode_uuid(t, "tenant"))
            .transpose()?;
        Ok(Principal {
            id: decode_uuid(&self.record_id, "principal")?,
            email: self.email,
            full_name: self.full_name,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            tenant_id,
            is_active: self.is_active,
            email_verified: self.email_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn role_to_string(role: PrincipalRole) -> &'static str {
    match role {
        PrincipalRole::PlatformOperator => "PlatformOperator",
        PrincipalRole::TenantAdmin => "TenantAdmin",
        PrincipalRole::Editor => "Editor",
    }
}

fn parse_role(s: &str) -> Result<PrincipalRole, DbError> {
    match s {
        "PlatformOperator" => Ok(PrincipalRole::PlatformOperator),
        "TenantAdmin" => Ok(PrincipalRole::TenantAdmin),
        "Editor" => Ok(PrincipalRole::Editor),
        other => Err(DbError::Decode(format!("unknown principal role: {other}"))),
    }
}

/// Emails are compared case-insensitively by storing them lower-cased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct SurrealPrincipalRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPrincipalRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// `set_clause` may reference `$password_hash`, bound from the
    /// argument.
    async fn update_one(
        &self,
        id: Uuid,
        set_clause: &str,
        password_hash: Option<String>,
    ) -> EcmsResult<Principal> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(format!(
                "UPDATE type::record('principal', $id) SET {set_clause}, \
                 updated_at = time::now() \
                 RETURN meta::id(id) AS record_id, *"
            ))
            .bind(("id", id_str.clone()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<PrincipalRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.try_into_principal()?)
    }
}

impl<C: Connection> PrincipalRepository for SurrealPrincipalRepository<C> {
    async fn create(&self, input: CreatePrincipal) -> EcmsResult<Principal> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('principal', $id) SET \
                 email = $email, \
                 full_name = $full_name, \
                 password_hash = $password_hash, \
                 role = $role, \
                 tenant_id = $tenant_id, \
                 is_active = true, \
                 email_verified = $email_verified \
                 RETURN meta::id(id) AS record_id, *",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", normalize_email(&input.email)))
            .bind(("full_name", input.full_name))
            .bind(("password_hash", input.password_hash))
            .bind(("role", role_to_string(input.role).to_string()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("email_verified", input.email_verified))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<PrincipalRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.try_into_principal()?)
    }

    async fn get_by_id(&self, id: Uuid) -> EcmsResult<Principal> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('principal', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PrincipalRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.try_into_principal()?)
    }

    async fn get_by_email(&self, email: &str) -> EcmsResult<Principal> {
        let email = normalize_email(email);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM principal \
                 WHERE email = $email LIMIT 1",
            )
            .bind(("email", email.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PrincipalRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: format!("email={email}"),
        })?;

        Ok(row.try_into_principal()?)
    }

    async fn upsert_by_email(&self, input: CreatePrincipal) -> EcmsResult<Upserted<Principal>> {
        match self.get_by_email(&input.email).await {
            Ok(existing) => return Ok(Upserted::Existing(existing)),
            Err(EcmsError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let email = input.email.clone();
        match self.create(input).await {
            Ok(created) => Ok(Upserted::Created(created)),
            // Lost a race with a concurrent insert of the same email.
            Err(e) if e.is_conflict_on("principal", "email") => {
                debug!("Principal created concurrently, returning existing row");
                Ok(Upserted::Existing(self.get_by_email(&email).await?))
            }
            Err(e) => Err(e),
        }
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> EcmsResult<Principal> {
        self.update_one(
            id,
            "password_hash = $password_hash",
            Some(password_hash.to_string()),
        )
        .await
    }

    async fn mark_email_verified(&self, id: Uuid) -> EcmsResult<Principal> {
        self.update_one(id, "email_verified = true", None).await
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> EcmsResult<Vec<Principal>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM principal \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY created_at ASC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PrincipalRowWithId> = result.take(0).map_err(DbError::from)?;

        rows.into_iter()
            .map(|row| row.try_into_principal().map_err(Into::into))
            .collect()
    }
}
