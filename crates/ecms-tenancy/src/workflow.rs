//! Site request review workflow: public submission, then operator
//! approval or rejection.

use ecms_core::error::{EcmsError, EcmsResult};
use ecms_core::models::site_request::{CreateSiteRequest, SiteCreationRequest, SiteRequestStatus};
use ecms_core::notify::{Notifier, send_best_effort};
use ecms_core::repository::{
    PaginatedResult, Pagination, ProvisioningStore, SiteRequestRepository, TenantRepository,
};
use tracing::info;
use uuid::Uuid;

use crate::provisioning::{ProvisionResult, TenantProvisioningService};

const MAX_SITE_NAME_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 254;

/// Syntactic email check: one `@`, non-empty local part, dotted domain,
/// no whitespace.
fn validate_email(email: &str) -> EcmsResult<()> {
    let invalid = |why: &str| Err(EcmsError::validation(format!("referent email {why}")));

    if email.is_empty() {
        return invalid("is required");
    }
    if email.len() > MAX_EMAIL_LEN {
        return invalid("is too long");
    }
    if email.contains(char::is_whitespace) {
        return invalid("contains whitespace");
    }
    let Some((local, domain)) = email.split_once('@') else {
        return invalid("must contain '@'");
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return invalid("is malformed");
    }
    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return invalid("has an invalid domain");
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim and check a submission. The email comes back lower-cased.
fn normalize_submission(input: CreateSiteRequest) -> EcmsResult<CreateSiteRequest> {
    let site_name = input.site_name.trim().to_string();
    if site_name.is_empty() {
        return Err(EcmsError::validation("site name is required"));
    }
    if site_name.chars().count() > MAX_SITE_NAME_LEN {
        return Err(EcmsError::validation(format!(
            "site name must be at most {MAX_SITE_NAME_LEN} characters"
        )));
    }
    let referent_name = input.referent_name.trim().to_string();
    if referent_name.is_empty() {
        return Err(EcmsError::validation("referent name is required"));
    }
    let referent_email = input.referent_email.trim().to_lowercase();
    validate_email(&referent_email)?;

    Ok(CreateSiteRequest {
        site_name,
        referent_name,
        referent_email,
        referent_phone: non_empty(input.referent_phone),
        motivation: non_empty(input.motivation),
    })
}

/// Operator-facing workflow over site requests.
pub struct RequestReviewWorkflow<T, S, PS, N>
where
    T: TenantRepository,
    S: SiteRequestRepository,
    PS: ProvisioningStore,
    N: Notifier,
{
    provisioning: TenantProvisioningService<T, S, PS, N>,
}

impl<T, S, PS, N> RequestReviewWorkflow<T, S, PS, N>
where
    T: TenantRepository,
    S: SiteRequestRepository,
    PS: ProvisioningStore,
    N: Notifier,
{
    pub fn new(provisioning: TenantProvisioningService<T, S, PS, N>) -> Self {
        Self { provisioning }
    }

    pub fn provisioning(&self) -> &TenantProvisioningService<T, S, PS, N> {
        &self.provisioning
    }

    /// Record a new `Pending` request and acknowledge it to the referent.
    pub async fn submit_request(
        &self,
        input: CreateSiteRequest,
    ) -> EcmsResult<SiteCreationRequest> {
        let input = normalize_submission(input)?;
        let now = self.provisioning.now();
        let request = self.provisioning.requests().create(input, now).await?;
        info!(request_id = %request.id, site_name = %request.site_name, "Site request submitted");

        let body = format!(
            "Bonjour {},\n\nNous avons bien reçu votre demande de site « {} ».\n\
             Elle sera examinée par l'équipe E-CMS.",
            request.referent_name, request.site_name
        );
        send_best_effort(
            self.provisioning.notifier(),
            &request.referent_email,
            "Demande de site E-CMS reçue",
            &body,
        )
        .await;

        Ok(request)
    }

    pub async fn approve_request(
        &self,
        id: Uuid,
        notes: Option<&str>,
    ) -> EcmsResult<ProvisionResult> {
        self.provisioning.provision(id, notes).await
    }

    pub async fn reject_request(&self, id: Uuid, reason: &str) -> EcmsResult<SiteCreationRequest> {
        self.provisioning.reject(id, reason).await
    }

    /// Approve each id in turn. One failure does not stop the others.
    pub async fn approve_many(&self, ids: &[Uuid]) -> Vec<(Uuid, EcmsResult<ProvisionResult>)> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            results.push((id, self.approve_request(id, None).await));
        }
        results
    }

    /// Reject each id in turn with the same reason.
    pub async fn reject_many(
        &self,
        ids: &[Uuid],
        reason: &str,
    ) -> Vec<(Uuid, EcmsResult<SiteCreationRequest>)> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            results.push((id, self.reject_request(id, reason).await));
        }
        results
    }

    /// Review queue, newest first.
    pub async fn list_requests(
        &self,
        status: Option<SiteRequestStatus>,
        pagination: Pagination,
    ) -> EcmsResult<PaginatedResult<SiteCreationRequest>> {
        self.provisioning.requests().list(status, pagination).await
    }
}
