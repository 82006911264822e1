//! Tenant domain model.
//!
//! A tenant is an onboarded municipality. Every public-site entity is
//! scoped to exactly one tenant, and a tenant is reachable on its own
//! subdomain of the platform domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

/// An isolated municipal site scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    /// Human-readable name (the municipality's name).
    pub name: String,
    /// URL-safe globally unique identifier (e.g., `kribi`). Never changes
    /// once assigned.
    pub slug: String,
    /// Fully qualified host, always `{slug}.{platform domain}`.
    pub domain: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    /// When the onboarding request behind this tenant was approved.
    pub validated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Public site URL, e.g. `https://kribi.ecms.cm`.
    pub fn public_url(&self, scheme: &str) -> String {
        format!("{scheme}://{}", self.domain)
    }
}

/// Fields required to create a tenant during provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub domain: String,
}
