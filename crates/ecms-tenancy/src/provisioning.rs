//! Tenant provisioning: turns an approved site request into a live tenant
//! with its administrator and baseline service catalog.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ecms_auth::AuthConfig;
use ecms_auth::password;
use ecms_core::clock::Clock;
use ecms_core::config::PlatformConfig;
use ecms_core::error::{EcmsError, EcmsResult};
use ecms_core::models::principal::{CreatePrincipal, Principal, PrincipalRole};
use ecms_core::models::provisioning::{ProvisionPlan, ProvisionedTenant};
use ecms_core::models::service_catalog::ServiceCatalogEntry;
use ecms_core::models::site_request::{SiteCreationRequest, SiteRequestStatus};
use ecms_core::models::tenant::{CreateTenant, Tenant};
use ecms_core::notify::{Notifier, send_best_effort};
use ecms_core::repository::{ProvisioningStore, SiteRequestRepository, TenantRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::slug;

/// Extra attempts for transient storage failures on a still-pending
/// request.
const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Reason recorded when an operator rejects without giving one.
pub const DEFAULT_REJECTION_REASON: &str = "Request rejected by the administrator";

/// Outcome of a successful provisioning.
///
/// `admin_temporary_password` is the only copy of the plaintext. The
/// caller hands it to the administrator; it is never stored or logged.
#[derive(Clone)]
pub struct ProvisionResult {
    pub tenant: Tenant,
    pub admin_principal: Principal,
    pub admin_temporary_password: String,
    pub catalog: Vec<ServiceCatalogEntry>,
    pub request: SiteCreationRequest,
}

impl fmt::Debug for ProvisionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionResult")
            .field("tenant", &self.tenant)
            .field("admin_principal_id", &self.admin_principal.id)
            .field("admin_temporary_password", &"<redacted>")
            .field("catalog", &self.catalog.len())
            .field("request_id", &self.request.id)
            .finish()
    }
}

/// Provisions tenants from pending site requests and records decisions.
pub struct TenantProvisioningService<T, S, PS, N>
where
    T: TenantRepository,
    S: SiteRequestRepository,
    PS: ProvisioningStore,
    N: Notifier,
{
    tenants: T,
    requests: S,
    store: PS,
    notifier: N,
    clock: Arc<dyn Clock>,
    platform: Arc<PlatformConfig>,
    auth: AuthConfig,
}

impl<T, S, PS, N> TenantProvisioningService<T, S, PS, N>
where
    T: TenantRepository,
    S: SiteRequestRepository,
    PS: ProvisioningStore,
    N: Notifier,
{
    pub fn new(
        tenants: T,
        requests: S,
        store: PS,
        notifier: N,
        clock: Arc<dyn Clock>,
        platform: Arc<PlatformConfig>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            tenants,
            requests,
            store,
            notifier,
            clock,
            platform,
            auth,
        }
    }

    pub(crate) fn requests(&self) -> &S {
        &self.requests
    }

    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Approve `request_id`: create the tenant, its administrator and the
    /// baseline catalog, and mark the request `Approved`, all in one
    /// storage transaction.
    ///
    /// Fails with `NotFound` for an unknown request, `InvalidState` when
    /// it is no longer pending (including losing a concurrent approval),
    /// and `Conflict` on `principal.email` when the referent already has
    /// an account. No rows are left behind on failure.
    pub async fn provision(
        &self,
        request_id: Uuid,
        notes: Option<&str>,
    ) -> EcmsResult<ProvisionResult> {
        let request = self.requests.get_by_id(request_id).await?;
        ensure_pending(&request)?;

        let base = slug::slugify(&request.site_name);
        if base.is_empty() {
            return Err(EcmsError::validation(
                "site name does not yield a usable subdomain",
            ));
        }

        let temporary_password =
            password::generate_temporary_password(self.auth.temporary_password_length);
        let password_hash =
            password::hash_password(&temporary_password, self.auth.pepper.as_deref())?;

        // A reserved label would never resolve to the tenant.
        let mut attempt = u32::from(self.platform.is_reserved(&base));
        let mut transient_retries = 0;
        let provisioned = loop {
            let (slug, found) =
                slug::first_free_candidate(&self.tenants, &base, attempt).await?;
            attempt = found;

            let plan = self.plan(&request, &slug, &password_hash, notes);
            match self.store.provision(plan).await {
                Ok(provisioned) => break provisioned,
                Err(e)
                    if e.is_conflict_on("tenant", "slug")
                        || e.is_conflict_on("tenant", "domain") =>
                {
                    debug!(
                        request_id = %request_id,
                        slug = %slug,
                        "Slug claimed concurrently, trying next suffix"
                    );
                    attempt += 1;
                }
                Err(e @ (EcmsError::InvalidState { .. } | EcmsError::Conflict { .. })) => {
                    return Err(e);
                }
                Err(e) => {
                    let current = self.requests.get_by_id(request_id).await?;
                    ensure_pending(&current)?;
                    if !e.is_retryable() || transient_retries >= MAX_TRANSIENT_RETRIES {
                        return Err(e);
                    }
                    transient_retries += 1;
                    warn!(
                        request_id = %request_id,
                        attempt = transient_retries,
                        error = %e,
                        "Provisioning failed transiently, retrying"
                    );
                }
            }
        };

        let ProvisionedTenant {
            tenant,
            admin,
            catalog,
            request,
        } = provisioned;

        info!(
            request_id = %request.id,
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            admin_id = %admin.id,
            services = catalog.len(),
            "Site request approved, tenant provisioned"
        );

        let url = self.platform.tenant_url(&tenant.slug);
        let body = format!(
            "Bonjour {},\n\nVotre site « {} » est en ligne : {url}\n\
             Identifiant administrateur : {}\n\
             Votre mot de passe temporaire vous sera communiqué séparément.",
            request.referent_name, tenant.name, admin.email
        );
        send_best_effort(
            &self.notifier,
            &request.referent_email,
            "Votre site E-CMS est prêt",
            &body,
        )
        .await;

        Ok(ProvisionResult {
            tenant,
            admin_principal: admin,
            admin_temporary_password: temporary_password,
            catalog,
            request,
        })
    }

    fn plan(
        &self,
        request: &SiteCreationRequest,
        slug: &str,
        password_hash: &str,
        notes: Option<&str>,
    ) -> ProvisionPlan {
        ProvisionPlan {
            request_id: request.id,
            tenant: CreateTenant {
                name: request.site_name.clone(),
                slug: slug.to_string(),
                domain: self.platform.tenant_domain(slug),
            },
            admin: CreatePrincipal {
                email: request.referent_email.clone(),
                full_name: request.referent_name.clone(),
                password_hash: password_hash.to_string(),
                role: PrincipalRole::TenantAdmin,
                // Filled in by the store with the new tenant's id.
                tenant_id: None,
                email_verified: true,
            },
            services: self.platform.default_services.clone(),
            admin_notes: notes.map(str::to_string),
            now: self.clock.now(),
        }
    }

    /// Reject a pending request. An empty `reason` is replaced by
    /// [`DEFAULT_REJECTION_REASON`].
    pub async fn reject(
        &self,
        request_id: Uuid,
        reason: &str,
    ) -> EcmsResult<SiteCreationRequest> {
        let reason = match reason.trim() {
            "" => DEFAULT_REJECTION_REASON,
            r => r,
        };
        let request = self
            .requests
            .reject(request_id, reason, self.clock.now())
            .await?;
        info!(request_id = %request.id, "Site request rejected");

        let body = format!(
            "Bonjour {},\n\nVotre demande de site « {} » n'a pas été retenue.\n\
             Motif : {reason}",
            request.referent_name, request.site_name
        );
        send_best_effort(
            &self.notifier,
            &request.referent_email,
            "Votre demande de site E-CMS",
            &body,
        )
        .await;

        Ok(request)
    }
}

fn ensure_pending(request: &SiteCreationRequest) -> EcmsResult<()> {
    if request.status.can_transition_to(SiteRequestStatus::Approved) {
        Ok(())
    } else {
        Err(EcmsError::invalid_state(
            "site_request",
            format!("request is already {}", request.status.as_str()),
        ))
    }
}
