//! Integration tests for tenant provisioning against in-memory SurrealDB.

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use ecms_auth::AuthConfig;
use ecms_auth::password;
use ecms_core::clock::ManualClock;
use ecms_core::config::PlatformConfig;
use ecms_core::error::EcmsError;
use ecms_core::models::principal::{CreatePrincipal, PrincipalRole};
use ecms_core::models::site_request::{CreateSiteRequest, SiteRequestStatus};
use ecms_core::models::tenant::TenantStatus;
use ecms_core::notify::{Notifier, NotifyError};
use ecms_core::repository::{
    PrincipalRepository, ServiceCatalogRepository, SiteRequestRepository, TenantRepository,
};
use ecms_db::repository::{
    SurrealPrincipalRepository, SurrealProvisioningStore, SurrealServiceCatalogRepository,
    SurrealSiteRequestRepository, SurrealTenantRepository,
};
use ecms_tenancy::{DEFAULT_REJECTION_REASON, RequestReviewWorkflow, TenantProvisioningService};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), body.into()));
        Ok(())
    }
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        Err(NotifyError("smtp unreachable".into()))
    }
}

type Workflow<N> = RequestReviewWorkflow<
    SurrealTenantRepository<Db>,
    SurrealSiteRequestRepository<Db>,
    SurrealProvisioningStore<Db>,
    N,
>;

async fn database() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    ecms_db::run_migrations(&db).await.unwrap();
    db
}

fn workflow_with<N: Notifier>(db: &Surreal<Db>, notifier: N) -> Workflow<N> {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()));
    RequestReviewWorkflow::new(TenantProvisioningService::new(
        SurrealTenantRepository::new(db.clone()),
        SurrealSiteRequestRepository::new(db.clone()),
        SurrealProvisioningStore::new(db.clone()),
        notifier,
        clock,
        Arc::new(PlatformConfig::default()),
        AuthConfig::default(),
    ))
}

async fn setup() -> (Surreal<Db>, Workflow<RecordingNotifier>, RecordingNotifier) {
    let db = database().await;
    let notifier = RecordingNotifier::default();
    let workflow = workflow_with(&db, notifier.clone());
    (db, workflow, notifier)
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

async fn count(db: &Surreal<Db>, table: &str) -> u64 {
    let mut result = db
        .query(format!("SELECT count() AS total FROM {table} GROUP ALL"))
        .await
        .unwrap();
    let rows: Vec<CountRow> = result.take(0).unwrap();
    rows.first().map(|r| r.total).unwrap_or(0)
}

fn submission(site_name: &str, email: &str) -> CreateSiteRequest {
    CreateSiteRequest {
        site_name: site_name.into(),
        referent_name: "Awa Mballa".into(),
        referent_email: email.into(),
        referent_phone: None,
        motivation: Some("Informer les habitants".into()),
    }
}

#[tokio::test]
async fn approval_creates_tenant_admin_and_catalog() {
    let (db, workflow, notifier) = setup().await;
    let request = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();

    let result = workflow
        .approve_request(request.id, Some("Dossier complet"))
        .await
        .unwrap();

    assert_eq!(result.tenant.slug, "kribi");
    assert_eq!(result.tenant.domain, "kribi.ecms.cm");
    assert_eq!(result.tenant.status, TenantStatus::Active);
    assert!(result.tenant.validated_at.is_some());

    let admin = &result.admin_principal;
    assert_eq!(admin.email, "awa@kribi.cm");
    assert_eq!(admin.role, PrincipalRole::TenantAdmin);
    assert_eq!(admin.tenant_id, Some(result.tenant.id));
    assert!(admin.email_verified);
    assert!(admin.is_active);

    assert_eq!(result.admin_temporary_password.len(), 12);
    assert!(result.admin_temporary_password.chars().all(|c| c.is_ascii_alphanumeric()));
    assert!(
        password::verify_password(&result.admin_temporary_password, &admin.password_hash, None)
            .unwrap()
    );

    assert_eq!(result.catalog.len(), 5);
    let positions: Vec<u32> = result.catalog.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);

    assert_eq!(result.request.status, SiteRequestStatus::Approved);
    assert_eq!(result.request.tenant_id, Some(result.tenant.id));
    assert_eq!(result.request.admin_notes.as_deref(), Some("Dossier complet"));
    assert!(result.request.decided_at.is_some());

    assert_eq!(count(&db, "tenant").await, 1);
    assert_eq!(count(&db, "principal").await, 1);
    assert_eq!(count(&db, "service_catalog_entry").await, 5);

    let catalog = SurrealServiceCatalogRepository::new(db.clone())
        .list_by_tenant(result.tenant.id)
        .await
        .unwrap();
    assert_eq!(catalog.len(), 5);

    // Acknowledgement, then the approval notice.
    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    let (to, _, body) = &sent[1];
    assert_eq!(to, "awa@kribi.cm");
    assert!(body.contains("https://kribi.ecms.cm"));
    assert!(!body.contains(&result.admin_temporary_password));
}

#[tokio::test]
async fn duplicate_admin_email_leaves_no_rows() {
    let (db, workflow, _) = setup().await;
    SurrealPrincipalRepository::new(db.clone())
        .create(CreatePrincipal {
            email: "awa@kribi.cm".into(),
            full_name: "Existing".into(),
            password_hash: "$argon2id$placeholder".into(),
            role: PrincipalRole::Editor,
            tenant_id: None,
            email_verified: true,
        })
        .await
        .unwrap();
    let request = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();

    let err = workflow.approve_request(request.id, None).await.unwrap_err();
    assert!(err.is_conflict_on("principal", "email"), "{err}");

    assert_eq!(count(&db, "tenant").await, 0);
    assert_eq!(count(&db, "principal").await, 1);
    assert_eq!(count(&db, "service_catalog_entry").await, 0);

    let after = SurrealSiteRequestRepository::new(db)
        .get_by_id(request.id)
        .await
        .unwrap();
    assert_eq!(after.status, SiteRequestStatus::Pending);
    assert!(after.tenant_id.is_none());
}

#[tokio::test]
async fn concurrent_approvals_yield_one_tenant() {
    let (db, workflow, _) = setup().await;
    let request = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        workflow.approve_request(request.id, None),
        workflow.approve_request(request.id, None),
    );

    let outcomes = [first, second];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = outcomes.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(failure, EcmsError::InvalidState { .. }), "{failure}");

    assert_eq!(count(&db, "tenant").await, 1);
    assert_eq!(count(&db, "principal").await, 1);
    assert_eq!(count(&db, "service_catalog_entry").await, 5);
}

#[tokio::test]
async fn same_site_name_gets_numbered_slug() {
    let (_db, workflow, _) = setup().await;
    let first = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();
    let second = workflow
        .submit_request(submission("Kribi", "paul@kribi.cm"))
        .await
        .unwrap();

    let a = workflow.approve_request(first.id, None).await.unwrap();
    let b = workflow.approve_request(second.id, None).await.unwrap();

    assert_eq!(a.tenant.slug, "kribi");
    assert_eq!(b.tenant.slug, "kribi-1");
    assert_eq!(b.tenant.domain, "kribi-1.ecms.cm");
}

#[tokio::test]
async fn decided_requests_cannot_be_approved_again() {
    let (db, workflow, _) = setup().await;
    let approved = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();
    workflow.approve_request(approved.id, None).await.unwrap();

    let err = workflow.approve_request(approved.id, None).await.unwrap_err();
    assert!(matches!(err, EcmsError::InvalidState { .. }), "{err}");

    let rejected = workflow
        .submit_request(submission("Limbé", "marie@limbe.cm"))
        .await
        .unwrap();
    workflow.reject_request(rejected.id, "").await.unwrap();
    let err = workflow.approve_request(rejected.id, None).await.unwrap_err();
    assert!(matches!(err, EcmsError::InvalidState { .. }), "{err}");

    assert_eq!(count(&db, "tenant").await, 1);
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let (_db, workflow, _) = setup().await;
    let err = workflow.approve_request(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, EcmsError::NotFound { .. }), "{err}");
    let err = workflow.reject_request(Uuid::new_v4(), "non").await.unwrap_err();
    assert!(matches!(err, EcmsError::NotFound { .. }), "{err}");
}

#[tokio::test]
async fn unusable_site_name_is_a_validation_error() {
    let (db, workflow, _) = setup().await;
    let request = workflow
        .submit_request(submission("!!!", "awa@kribi.cm"))
        .await
        .unwrap();

    let err = workflow.approve_request(request.id, None).await.unwrap_err();
    assert!(matches!(err, EcmsError::Validation { .. }), "{err}");
    assert_eq!(count(&db, "tenant").await, 0);
}

#[tokio::test]
async fn reject_uses_default_reason_and_notifies() {
    let (_db, workflow, notifier) = setup().await;
    let request = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();

    let rejected = workflow.reject_request(request.id, "   ").await.unwrap();
    assert_eq!(rejected.status, SiteRequestStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
    assert!(rejected.decided_at.is_some());
    assert!(rejected.tenant_id.is_none());

    let sent = notifier.sent();
    assert!(sent.last().unwrap().2.contains(DEFAULT_REJECTION_REASON));

    let err = workflow.reject_request(request.id, "encore").await.unwrap_err();
    assert!(matches!(err, EcmsError::InvalidState { .. }), "{err}");
}

#[tokio::test]
async fn notifier_failure_does_not_undo_approval() {
    let db = database().await;
    let workflow = workflow_with(&db, FailingNotifier);
    let request = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();

    let result = workflow.approve_request(request.id, None).await.unwrap();

    let tenant = SurrealTenantRepository::new(db)
        .get_by_slug("kribi")
        .await
        .unwrap();
    assert_eq!(tenant.id, result.tenant.id);
}

#[tokio::test]
async fn bulk_actions_report_per_id() {
    let (_db, workflow, _) = setup().await;
    let a = workflow
        .submit_request(submission("Kribi", "awa@kribi.cm"))
        .await
        .unwrap();
    let b = workflow
        .submit_request(submission("Limbé", "marie@limbe.cm"))
        .await
        .unwrap();
    let missing = Uuid::new_v4();

    let approved = workflow.approve_many(&[a.id, missing]).await;
    assert_eq!(approved.len(), 2);
    assert_eq!(approved[0].0, a.id);
    assert!(approved[0].1.is_ok());
    assert!(matches!(approved[1].1, Err(EcmsError::NotFound { .. })));

    let rejected = workflow.reject_many(&[a.id, b.id], "Hors périmètre").await;
    assert!(matches!(rejected[0].1, Err(EcmsError::InvalidState { .. })));
    let b_after = rejected[1].1.as_ref().unwrap();
    assert_eq!(b_after.rejection_reason.as_deref(), Some("Hors périmètre"));
}

#[tokio::test]
async fn reserved_site_name_skips_bare_slug() {
    let (_db, workflow, _) = setup().await;
    let request = workflow
        .submit_request(submission("Admin", "awa@kribi.cm"))
        .await
        .unwrap();

    let result = workflow.approve_request(request.id, None).await.unwrap();
    assert_eq!(result.tenant.slug, "admin-1");
}
