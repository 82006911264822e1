//! SurrealDB implementation of [`TenantRepository`].

use chrono::{DateTime, Utc};
use ecms_core::error::EcmsResult;
use ecms_core::models::tenant::{Tenant, TenantStatus};
use ecms_core::repository::{PaginatedResult, Pagination, TenantRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::CountRow;
use crate::error::{DbError, decode_uuid};

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct TenantRowWithId {
    record_id: String,
    name: String,
    slug: String,
    domain: String,
    status: String,
    created_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
}

impl TenantRowWithId {
    pub(crate) fn try_into_tenant(self) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id: decode_uuid(&self.record_id, "tenant")?,
            name: self.name,
            slug: self.slug,
            domain: self.domain,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            validated_at: self.validated_at,
        })
    }
}

pub(crate) fn status_to_string(status: TenantStatus) -> &'static str {
    match status {
        TenantStatus::Active => "Active",
        TenantStatus::Suspended => "Suspended",
        TenantStatus::Inactive => "Inactive",
    }
}

fn parse_status(s: &str) -> Result<TenantStatus, DbError> {
    match s {
        "Active" => Ok(TenantStatus::Active),
        "Suspended" => Ok(TenantStatus::Suspended),
        "Inactive" => Ok(TenantStatus::Inactive),
        other => Err(DbError::Decode(format!("unknown tenant status: {other}"))),
    }
}

/// SurrealDB implementation of the Tenant repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_one_by_slug(&self, slug: &str, active_only: bool) -> EcmsResult<Option<Tenant>> {
        let query = if active_only {
            "SELECT meta::id(id) AS record_id, * FROM tenant \
             WHERE slug = $slug AND status = 'Active' LIMIT 1"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM tenant \
             WHERE slug = $slug LIMIT 1"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_tenant()?)),
            None => Ok(None),
        }
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> EcmsResult<Tenant> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('tenant', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.try_into_tenant()?)
    }

    async fn get_by_slug(&self, slug: &str) -> EcmsResult<Tenant> {
        self.find_one_by_slug(slug, false).await?.ok_or_else(|| {
            DbError::NotFound {
                entity: "tenant".into(),
                id: format!("slug={slug}"),
            }
            .into()
        })
    }

    async fn find_active_by_slug(&self, slug: &str) -> EcmsResult<Option<Tenant>> {
        self.find_one_by_slug(slug, true).await
    }

    async fn slug_exists(&self, slug: &str) -> EcmsResult<bool> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM tenant WHERE slug = $slug GROUP ALL")
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().is_some_and(|r| r.total > 0))
    }

    async fn set_status(&self, id: Uuid, status: TenantStatus) -> EcmsResult<Tenant> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET status = $status; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('tenant', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("status", status_to_string(status).to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        // Statement 0 is the UPDATE, statement 1 reads the row back.
        let rows: Vec<TenantRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.try_into_tenant()?)
    }

    async fn list(&self, pagination: Pagination) -> EcmsResult<PaginatedResult<Tenant>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM tenant GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_tenant())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
