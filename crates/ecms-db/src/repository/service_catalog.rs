//! SurrealDB implementation of [`ServiceCatalogRepository`].

use chrono::{DateTime, Utc};
use ecms_core::error::EcmsResult;
use ecms_core::models::service_catalog::ServiceCatalogEntry;
use ecms_core::repository::ServiceCatalogRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, decode_uuid};

#[derive(Debug, SurrealValue)]
pub(crate) struct ServiceCatalogRowWithId {
    record_id: String,
    tenant_id: String,
    name: String,
    description: String,
    position: u32,
    active: bool,
    created_at: DateTime<Utc>,
}

impl ServiceCatalogRowWithId {
    pub(crate) fn try_into_entry(self) -> Result<ServiceCatalogEntry, DbError> {
        Ok(ServiceCatalogEntry {
            id: decode_uuid(&self.record_id, "service catalog entry")?,
            tenant_id: decode_uuid(&self.tenant_id, "tenant")?,
            name: self.name,
            description: self.description,
            position: self.position,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

const SELECT_BY_TENANT: &str = "SELECT meta::id(id) AS record_id, * \
     FROM service_catalog_entry \
     WHERE tenant_id = $tenant_id \
     ORDER BY position ASC";

#[derive(Clone)]
pub struct SurrealServiceCatalogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealServiceCatalogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ServiceCatalogRepository for SurrealServiceCatalogRepository<C> {
    async fn list_by_tenant(&self, tenant_id: Uuid) -> EcmsResult<Vec<ServiceCatalogEntry>> {
        let mut result = self
            .db
            .query(SELECT_BY_TENANT)
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServiceCatalogRowWithId> = result.take(0).map_err(DbError::from)?;

        rows.into_iter()
            .map(|row| row.try_into_entry().map_err(Into::into))
            .collect()
    }
}
