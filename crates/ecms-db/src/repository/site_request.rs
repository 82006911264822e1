//! SurrealDB implementation of [`SiteRequestRepository`].

use chrono::{DateTime, Utc};
use ecms_core::error::EcmsResult;
use ecms_core::models::site_request::{CreateSiteRequest, SiteCreationRequest, SiteRequestStatus};
use ecms_core::repository::{PaginatedResult, Pagination, SiteRequestRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::CountRow;
use crate::error::{DbError, decode_uuid};

#[derive(Debug, SurrealValue)]
pub(crate) struct SiteRequestRowWithId {
    record_id: String,
    site_name: String,
    referent_name: String,
    referent_email: String,
    referent_phone: Option<String>,
    motivation: Option<String>,
    status: String,
    tenant_id: Option<String>,
    rejection_reason: Option<String>,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl SiteRequestRowWithId {
    pub(crate) fn try_into_request(self) -> Result<SiteCreationRequest, DbError> {
        let tenant_id = self
            .tenant_id
            .as_deref()
            .map(|t| decode_uuid(t, "tenant"))
            .transpose()?;
        Ok(SiteCreationRequest {
            id: decode_uuid(&self.record_id, "site request")?,
            site_name: self.site_name,
            referent_name: self.referent_name,
            referent_email: self.referent_email,
            referent_phone: self.referent_phone,
            motivation: self.motivation,
            status: parse_status(&self.status)?,
            tenant_id,
            rejection_reason: self.rejection_reason,
            admin_notes: self.admin_notes,
            created_at: self.created_at,
            decided_at: self.decided_at,
        })
    }
}

fn parse_status(s: &str) -> Result<SiteRequestStatus, DbError> {
    match s {
        "Pending" => Ok(SiteRequestStatus::Pending),
        "Approved" => Ok(SiteRequestStatus::Approved),
        "Rejected" => Ok(SiteRequestStatus::Rejected),
        other => Err(DbError::Decode(format!("unknown request status: {other}"))),
    }
}

#[derive(Clone)]
pub struct SurrealSiteRequestRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSiteRequestRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SiteRequestRepository for SurrealSiteRequestRepository<C> {
    async fn create(
        &self,
        input: CreateSiteRequest,
        now: DateTime<Utc>,
    ) -> EcmsResult<SiteCreationRequest> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('site_request', $id) SET \
                 site_name = $site_name, \
                 referent_name = $referent_name, \
                 referent_email = $referent_email, \
                 referent_phone = $referent_phone, \
                 motivation = $motivation, \
                 status = 'Pending', \
                 created_at = $now \
                 RETURN meta::id(id) AS record_id, *",
            )
            .bind(("id", id_str.clone()))
            .bind(("site_name", input.site_name))
            .bind(("referent_name", input.referent_name))
            .bind(("referent_email", input.referent_email))
            .bind(("referent_phone", input.referent_phone))
            .bind(("motivation", input.motivation))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<SiteRequestRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "site_request".into(),
            id: id_str,
        })?;

        Ok(row.try_into_request()?)
    }

    async fn get_by_id(&self, id: Uuid) -> EcmsResult<SiteCreationRequest> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('site_request', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SiteRequestRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "site_request".into(),
            id: id_str,
        })?;

        Ok(row.try_into_request()?)
    }

    async fn list(
        &self,
        status: Option<SiteRequestStatus>,
        pagination: Pagination,
    ) -> EcmsResult<PaginatedResult<SiteCreationRequest>> {
        let filter = if status.is_some() {
            "WHERE status = $status"
        } else {
            ""
        };
        let status = status.map(|s| s.as_str().to_string());

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM site_request {filter} GROUP ALL"
            ))
            .bind(("status", status.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM site_request {filter} \
                 ORDER BY created_at DESC \
                 LIMIT $limit START $offset"
            ))
            .bind(("status", status))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SiteRequestRowWithId> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_request())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn reject(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> EcmsResult<SiteCreationRequest> {
        let id_str = id.to_string();

        // The WHERE guard makes the transition atomic: a concurrent
        // decision leaves nothing to update.
        let result = self
            .db
            .query(
                "UPDATE type::record('site_request', $id) SET \
                 status = 'Rejected', \
                 rejection_reason = $reason, \
                 decided_at = $at \
                 WHERE status = 'Pending' \
                 RETURN meta::id(id) AS record_id, *",
            )
            .bind(("id", id_str.clone()))
            .bind(("reason", reason.to_string()))
            .bind(("at", at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write_failure(e.to_string()))?;

        let rows: Vec<SiteRequestRowWithId> = result.take(0).map_err(DbError::from)?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(row.try_into_request()?);
        }

        // Nothing updated: either the request does not exist or it has
        // already been decided.
        let current = self.get_by_id(id).await?;
        Err(DbError::InvalidState {
            entity: "site_request".into(),
            reason: format!("cannot reject a request in state {}", current.status.as_str()),
        }
        .into())
    }
}
