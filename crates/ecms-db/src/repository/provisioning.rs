//! Transactional tenant provisioning.
//!
//! The tenant, its administrator, the seeded service catalog and the
//! request's transition to `Approved` are written by a single SurrealQL
//! transaction. The transaction re-checks the request status itself and
//! aborts with a marker error when it is no longer `Pending`, so two
//! concurrent approvals cannot both commit.

use ecms_core::error::EcmsResult;
use ecms_core::models::provisioning::{ProvisionPlan, ProvisionedTenant};
use ecms_core::repository::ProvisioningStore;
use serde_json::json;
use surrealdb::{Connection, Surreal};
use tracing::{debug, info};
use uuid::Uuid;

use super::principal::{PrincipalRowWithId, normalize_email, role_to_string};
use super::service_catalog::ServiceCatalogRowWithId;
use super::site_request::SiteRequestRowWithId;
use super::tenant::TenantRowWithId;
use super::transaction_failure;
use crate::error::{DbError, NOT_PENDING_MARKER};

fn provision_query() -> String {
    format!(
        "BEGIN TRANSACTION;
LET $current = (SELECT VALUE status FROM type::record('site_request', $request_id))[0];
IF $current != 'Pending' {{ THROW '{NOT_PENDING_MARKER}'; }};
CREATE type::record('tenant', $tenant_id) SET
    name = $tenant_name,
    slug = $slug,
    domain = $domain,
    status = 'Active',
    created_at = $now,
    validated_at = $now;
CREATE type::record('principal', $admin_id) SET
    email = $admin_email,
    full_name = $admin_name,
    password_hash = $admin_password_hash,
    role = $admin_role,
    tenant_id = $tenant_id,
    is_active = true,
    email_verified = $admin_email_verified,
    created_at = $now,
    updated_at = $now;
FOR $service IN $services {{
    CREATE type::record('service_catalog_entry', $service.id) SET
        tenant_id = $tenant_id,
        name = $service.name,
        description = $service.description,
        position = $service.position,
        active = true,
        created_at = $now;
}};
UPDATE type::record('site_request', $request_id) SET
    status = 'Approved',
    tenant_id = $tenant_id,
    admin_notes = $admin_notes,
    decided_at = $now
WHERE status = 'Pending';
COMMIT TRANSACTION;"
    )
}

const READ_BACK: &str = "\
SELECT meta::id(id) AS record_id, * FROM type::record('tenant', $tenant_id);
SELECT meta::id(id) AS record_id, * FROM type::record('principal', $admin_id);
SELECT meta::id(id) AS record_id, * FROM service_catalog_entry \
    WHERE tenant_id = $tenant_id ORDER BY position ASC;
SELECT meta::id(id) AS record_id, * FROM type::record('site_request', $request_id);";

#[derive(Clone)]
pub struct SurrealProvisioningStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealProvisioningStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn read_back(
        &self,
        tenant_id: &str,
        admin_id: &str,
        request_id: &str,
    ) -> Result<ProvisionedTenant, DbError> {
        let mut result = self
            .db
            .query(READ_BACK)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("admin_id", admin_id.to_string()))
            .bind(("request_id", request_id.to_string()))
            .await?;

        let tenants: Vec<TenantRowWithId> = result.take(0)?;
        let admins: Vec<PrincipalRowWithId> = result.take(1)?;
        let catalog: Vec<ServiceCatalogRowWithId> = result.take(2)?;
        let requests: Vec<SiteRequestRowWithId> = result.take(3)?;

        let missing = |entity: &str, id: &str| DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        };

        Ok(ProvisionedTenant {
            tenant: tenants
                .into_iter()
                .next()
                .ok_or_else(|| missing("tenant", tenant_id))?
                .try_into_tenant()?,
            admin: admins
                .into_iter()
                .next()
                .ok_or_else(|| missing("principal", admin_id))?
                .try_into_principal()?,
            catalog: catalog
                .into_iter()
                .map(|row| row.try_into_entry())
                .collect::<Result<Vec<_>, _>>()?,
            request: requests
                .into_iter()
                .next()
                .ok_or_else(|| missing("site_request", request_id))?
                .try_into_request()?,
        })
    }
}

impl<C: Connection> ProvisioningStore for SurrealProvisioningStore<C> {
    async fn provision(&self, plan: ProvisionPlan) -> EcmsResult<ProvisionedTenant> {
        let tenant_id = Uuid::new_v4().to_string();
        let admin_id = Uuid::new_v4().to_string();
        let request_id = plan.request_id.to_string();

        let services: Vec<serde_json::Value> = plan
            .services
            .iter()
            .enumerate()
            .map(|(i, service)| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "name": service.name,
                    "description": service.description,
                    "position": i + 1,
                })
            })
            .collect();

        let mut response = self
            .db
            .query(provision_query())
            .bind(("request_id", request_id.clone()))
            .bind(("tenant_id", tenant_id.clone()))
            .bind(("tenant_name", plan.tenant.name))
            .bind(("slug", plan.tenant.slug.clone()))
            .bind(("domain", plan.tenant.domain))
            .bind(("admin_id", admin_id.clone()))
            .bind(("admin_email", normalize_email(&plan.admin.email)))
            .bind(("admin_name", plan.admin.full_name))
            .bind(("admin_password_hash", plan.admin.password_hash))
            .bind(("admin_role", role_to_string(plan.admin.role).to_string()))
            .bind(("admin_email_verified", plan.admin.email_verified))
            .bind(("services", serde_json::Value::Array(services)))
            .bind(("admin_notes", plan.admin_notes))
            .bind(("now", plan.now))
            .await
            .map_err(DbError::from)?;

        let errors = response.take_errors();
        if !errors.is_empty() {
            let err = transaction_failure(errors);
            debug!(
                request_id = %request_id,
                slug = %plan.tenant.slug,
                error = %err,
                "Provisioning transaction aborted"
            );
            return Err(err.into());
        }

        let provisioned = self.read_back(&tenant_id, &admin_id, &request_id).await?;

        info!(
            request_id = %request_id,
            tenant_id = %provisioned.tenant.id,
            slug = %provisioned.tenant.slug,
            services = provisioned.catalog.len(),
            "Provisioning transaction committed"
        );

        Ok(provisioned)
    }
}
