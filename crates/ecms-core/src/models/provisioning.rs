//! Inputs and outputs of the atomic tenant provisioning transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::principal::{CreatePrincipal, Principal};
use super::service_catalog::{ServiceCatalogEntry, ServiceTemplate};
use super::site_request::SiteCreationRequest;
use super::tenant::{CreateTenant, Tenant};

/// Everything the store needs to provision one tenant in a single
/// transaction.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub request_id: Uuid,
    pub tenant: CreateTenant,
    pub admin: CreatePrincipal,
    pub services: Vec<ServiceTemplate>,
    pub admin_notes: Option<String>,
    /// Timestamp recorded as `created_at`, `validated_at` and `decided_at`.
    pub now: DateTime<Utc>,
}

/// Rows written by a committed provisioning transaction.
#[derive(Debug, Clone)]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub admin: Principal,
    pub catalog: Vec<ServiceCatalogEntry>,
    pub request: SiteCreationRequest,
}
