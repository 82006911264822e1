//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped reads take a
//! `tenant_id` parameter; global entities (tenants, site requests,
//! principals, credential tokens) are keyed by their own ids.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EcmsResult;
use crate::models::{
    credential_token::{CreateCredentialToken, CredentialToken, TokenKind},
    principal::{CreatePrincipal, Principal},
    provisioning::{ProvisionPlan, ProvisionedTenant},
    service_catalog::ServiceCatalogEntry,
    site_request::{CreateSiteRequest, SiteCreationRequest, SiteRequestStatus},
    tenant::{Tenant, TenantStatus},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Outcome of an idempotent create: whether the row was written by this
/// call or was already present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Upserted<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(v) | Self::Existing(v) => v,
        }
    }
}

// ---------------------------------------------------------------------------
// Tenants & onboarding (global scope)
// ---------------------------------------------------------------------------

/// Tenants are only ever created by [`ProvisioningStore::provision`].
pub trait TenantRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = EcmsResult<Tenant>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = EcmsResult<Tenant>> + Send;
    /// Indexed lookup used by host resolution. `None` when missing or
    /// not `Active`.
    fn find_active_by_slug(
        &self,
        slug: &str,
    ) -> impl Future<Output = EcmsResult<Option<Tenant>>> + Send;
    fn slug_exists(&self, slug: &str) -> impl Future<Output = EcmsResult<bool>> + Send;
    fn set_status(
        &self,
        id: Uuid,
        status: TenantStatus,
    ) -> impl Future<Output = EcmsResult<Tenant>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = EcmsResult<PaginatedResult<Tenant>>> + Send;
}

pub trait SiteRequestRepository: Send + Sync {
    /// Persists a new request in `Pending` state.
    fn create(
        &self,
        input: CreateSiteRequest,
        now: DateTime<Utc>,
    ) -> impl Future<Output = EcmsResult<SiteCreationRequest>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = EcmsResult<SiteCreationRequest>> + Send;
    /// Newest first. `None` lists every status.
    fn list(
        &self,
        status: Option<SiteRequestStatus>,
        pagination: Pagination,
    ) -> impl Future<Output = EcmsResult<PaginatedResult<SiteCreationRequest>>> + Send;
    /// Guarded `Pending -> Rejected` transition. Fails with `NotFound` or
    /// `InvalidState`.
    fn reject(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = EcmsResult<SiteCreationRequest>> + Send;
}

/// Performs the tenant provisioning steps as one storage transaction.
pub trait ProvisioningStore: Send + Sync {
    /// Either every row of the plan is written or none is. A request that
    /// is no longer `Pending` aborts with `InvalidState`; unique index
    /// violations surface as `Conflict { entity, field }`.
    fn provision(
        &self,
        plan: ProvisionPlan,
    ) -> impl Future<Output = EcmsResult<ProvisionedTenant>> + Send;
}

// ---------------------------------------------------------------------------
// Principals & credentials
// ---------------------------------------------------------------------------

pub trait PrincipalRepository: Send + Sync {
    fn create(&self, input: CreatePrincipal) -> impl Future<Output = EcmsResult<Principal>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = EcmsResult<Principal>> + Send;
    /// Case-insensitive: the email is lower-cased before lookup.
    fn get_by_email(&self, email: &str) -> impl Future<Output = EcmsResult<Principal>> + Send;
    /// Creates the principal unless one with the same email exists.
    fn upsert_by_email(
        &self,
        input: CreatePrincipal,
    ) -> impl Future<Output = EcmsResult<Upserted<Principal>>> + Send;
    fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> impl Future<Output = EcmsResult<Principal>> + Send;
    fn mark_email_verified(&self, id: Uuid) -> impl Future<Output = EcmsResult<Principal>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
    ) -> impl Future<Output = EcmsResult<Vec<Principal>>> + Send;
}

pub trait ServiceCatalogRepository: Send + Sync {
    /// Ordered by `position`.
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
    ) -> impl Future<Output = EcmsResult<Vec<ServiceCatalogEntry>>> + Send;
}

pub trait CredentialTokenRepository: Send + Sync {
    /// Marks every unused token of `(principal_id, kind)` as used and
    /// inserts the new one, atomically. Concurrent issuances for the same
    /// pair are serialized: all but one fail with `Transient`.
    fn issue(
        &self,
        input: CreateCredentialToken,
    ) -> impl Future<Output = EcmsResult<CredentialToken>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = EcmsResult<CredentialToken>> + Send;
    /// Most recent token of `(principal_id, kind)` carrying `code`.
    fn find_otp(
        &self,
        principal_id: Uuid,
        kind: TokenKind,
        code: &str,
    ) -> impl Future<Output = EcmsResult<Option<CredentialToken>>> + Send;
    /// Conditional `used = true`. Returns `false` when the token was
    /// already used (or vanished), so exactly one caller wins.
    fn mark_used(&self, id: Uuid) -> impl Future<Output = EcmsResult<bool>> + Send;
    /// Conditional `verified = true` plus hash rotation, guarded on the
    /// token still being unused and unverified.
    fn mark_verified(
        &self,
        id: Uuid,
        new_token_hash: &str,
    ) -> impl Future<Output = EcmsResult<bool>> + Send;
    /// Marks a password-reset token used and stores the principal's new
    /// password hash in one transaction. Returns `false`, writing nothing,
    /// when the token was already used.
    fn redeem_password_reset(
        &self,
        id: Uuid,
        principal_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = EcmsResult<bool>> + Send;
    /// Deletes tokens that expired before `now`. Returns the count.
    fn delete_expired(&self, now: DateTime<Utc>) -> impl Future<Output = EcmsResult<u64>> + Send;
}
