//! Integration tests for the credential token service.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use ecms_auth::config::AuthConfig;
use ecms_auth::password;
use ecms_auth::service::{CredentialTokenService, IssueMode, TokenCredential};
use ecms_auth::{INVALID_OR_EXPIRED_CODE, public_message};
use ecms_core::clock::ManualClock;
use ecms_core::error::EcmsError;
use ecms_core::models::credential_token::TokenKind;
use ecms_core::models::principal::{CreatePrincipal, Principal, PrincipalRole};
use ecms_core::notify::{Notifier, NotifyError};
use ecms_core::repository::PrincipalRepository;
use ecms_db::repository::{SurrealCredentialTokenRepository, SurrealPrincipalRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
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

type Service<N> =
    CredentialTokenService<SurrealPrincipalRepository<Db>, SurrealCredentialTokenRepository<Db>, N>;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Spin up in-memory DB, run migrations and create one principal.
async fn setup_with<N: Notifier>(notifier: N) -> (Service<N>, Arc<ManualClock>, Principal) {
    let db: Surreal<Db> = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    ecms_db::run_migrations(&db).await.unwrap();

    let principals = SurrealPrincipalRepository::new(db.clone());
    let principal = principals
        .create(CreatePrincipal {
            email: "maire@kribi.cm".into(),
            full_name: "Maire de Kribi".into(),
            password_hash: password::hash_password("initial-password", None).unwrap(),
            role: PrincipalRole::TenantAdmin,
            tenant_id: None,
            email_verified: false,
        })
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(start()));
    let service = CredentialTokenService::new(
        principals,
        SurrealCredentialTokenRepository::new(db),
        notifier,
        clock.clone(),
        AuthConfig::default(),
    );
    (service, clock, principal)
}

async fn setup() -> (Service<RecordingNotifier>, Arc<ManualClock>, Principal, RecordingNotifier) {
    let notifier = RecordingNotifier::default();
    let (service, clock, principal) = setup_with(notifier.clone()).await;
    (service, clock, principal, notifier)
}

fn otp(principal: &Principal, code: &str) -> TokenCredential {
    TokenCredential::Otp {
        email: principal.email.clone(),
        kind: TokenKind::PasswordReset,
        code: code.into(),
    }
}

#[tokio::test]
async fn email_verification_link_is_single_use() {
    let (service, _clock, principal, notifier) = setup().await;

    let issued = service
        .issue_token(principal.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    assert!(issued.otp_code.is_none());
    assert_eq!(issued.expires_at, start() + Duration::hours(24));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "maire@kribi.cm");
    assert!(sent[0].2.contains(&issued.token));

    let validated = service
        .validate_token(TokenCredential::Link(issued.token.clone()))
        .await
        .unwrap();
    assert_eq!(validated.id, principal.id);

    let err = service
        .validate_token(TokenCredential::Link(issued.token))
        .await
        .unwrap_err();
    assert!(matches!(err, EcmsError::AlreadyUsed), "{err}");
}

#[tokio::test]
async fn reissue_invalidates_previous_token() {
    let (service, _clock, principal, _) = setup().await;

    let first = service
        .issue_token(principal.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    let second = service
        .issue_token(principal.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    let err = service
        .validate(TokenCredential::Link(first.token))
        .await
        .unwrap_err();
    assert!(matches!(err, EcmsError::AlreadyUsed), "{err}");

    service
        .validate(TokenCredential::Link(second.token))
        .await
        .unwrap();
}

#[tokio::test]
async fn expiry_is_strict() {
    let (service, clock, principal, _) = setup().await;

    let first = service
        .issue(principal.id, TokenKind::EmailVerification, IssueMode::Link, Duration::hours(1))
        .await
        .unwrap();
    clock.set(first.expires_at);
    service
        .validate(TokenCredential::Link(first.token))
        .await
        .expect("a token is valid at exactly its expiry instant");

    let second = service
        .issue(principal.id, TokenKind::EmailVerification, IssueMode::Link, Duration::hours(1))
        .await
        .unwrap();
    clock.set(second.expires_at + Duration::milliseconds(1));
    let err = service
        .validate(TokenCredential::Link(second.token))
        .await
        .unwrap_err();
    assert!(matches!(err, EcmsError::Expired), "{err}");
}

#[tokio::test]
async fn otp_code_is_exchanged_for_a_permit() {
    let (service, _clock, principal, notifier) = setup().await;

    let issued = service
        .issue_token(principal.id, TokenKind::PasswordReset)
        .await
        .unwrap();
    let code = issued.otp_code.clone().expect("reset tokens carry a code");
    assert_eq!(issued.expires_at, start() + Duration::minutes(10));
    assert!(notifier.sent()[0].2.contains(&code));

    // The server-side handle cannot be consumed before the code is checked.
    let err = service.consume(&issued.token).await.unwrap_err();
    assert!(matches!(err, EcmsError::InvalidState { .. }), "{err}");

    let validated = service.validate(otp(&principal, &code)).await.unwrap();
    let permit = validated.permit.expect("verified codes yield a permit");
    assert_eq!(validated.principal.id, principal.id);

    let err = service.validate(otp(&principal, &code)).await.unwrap_err();
    assert!(matches!(err, EcmsError::AlreadyUsed), "{err}");

    let consumed = service.consume(&permit).await.unwrap();
    assert_eq!(consumed.id, principal.id);

    let err = service.consume(&permit).await.unwrap_err();
    assert!(matches!(err, EcmsError::AlreadyUsed), "{err}");
}

#[tokio::test]
async fn wrong_code_reads_as_invalid_or_expired() {
    let (service, _clock, principal, _) = setup().await;

    let issued = service
        .issue_token(principal.id, TokenKind::PasswordReset)
        .await
        .unwrap();
    let code = issued.otp_code.unwrap();
    let wrong = if code == "000000" { "000001" } else { "000000" };

    let err = service.validate(otp(&principal, wrong)).await.unwrap_err();
    assert!(matches!(err, EcmsError::NotFound { .. }), "{err}");
    assert_eq!(public_message(&err), INVALID_OR_EXPIRED_CODE);

    let unknown = TokenCredential::Otp {
        email: "nobody@kribi.cm".into(),
        kind: TokenKind::PasswordReset,
        code,
    };
    let err = service.validate(unknown).await.unwrap_err();
    assert_eq!(public_message(&err), INVALID_OR_EXPIRED_CODE);
}

#[tokio::test]
async fn password_reset_flow() {
    let (service, _clock, principal, notifier) = setup().await;

    service
        .request_password_reset("MAIRE@kribi.cm")
        .await
        .unwrap();
    let body = notifier.sent()[0].2.clone();
    let code: String = body
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 6)
        .expect("body carries the code")
        .into();

    let permit = service
        .validate(otp(&principal, &code))
        .await
        .unwrap()
        .permit
        .unwrap();

    let err = service.reset_password(&permit, "short").await.unwrap_err();
    assert!(matches!(err, EcmsError::Validation { .. }), "{err}");

    let updated = service
        .reset_password(&permit, "a much longer password")
        .await
        .unwrap();
    assert!(
        password::verify_password("a much longer password", &updated.password_hash, None).unwrap()
    );

    let err = service
        .reset_password(&permit, "yet another password")
        .await
        .unwrap_err();
    assert!(matches!(err, EcmsError::AlreadyUsed), "{err}");
}

#[tokio::test]
async fn confirm_email_marks_principal_verified() {
    let (service, _clock, principal, _) = setup().await;
    assert!(!principal.email_verified);

    let issued = service
        .issue_token(principal.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    let confirmed = service.confirm_email(&issued.token).await.unwrap();
    assert!(confirmed.email_verified);
}

#[tokio::test]
async fn reset_for_unknown_address_is_silent() {
    let (service, _clock, _principal, notifier) = setup().await;

    service
        .request_password_reset("ghost@kribi.cm")
        .await
        .unwrap();
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn issue_for_unknown_principal_is_not_found() {
    let (service, _clock, _principal, _) = setup().await;

    let err = service
        .issue_token(Uuid::new_v4(), TokenKind::EmailVerification)
        .await
        .unwrap_err();
    assert!(matches!(err, EcmsError::NotFound { .. }), "{err}");
}

#[tokio::test]
async fn notifier_failure_does_not_fail_issuance() {
    let (service, _clock, principal) = setup_with(FailingNotifier).await;

    let issued = service
        .issue_token(principal.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    service
        .validate(TokenCredential::Link(issued.token))
        .await
        .unwrap();
}

#[tokio::test]
async fn purge_removes_expired_tokens() {
    let (service, clock, principal, _) = setup().await;

    let issued = service
        .issue_token(principal.id, TokenKind::PasswordReset)
        .await
        .unwrap();
    assert_eq!(service.purge_expired().await.unwrap(), 0);

    clock.advance(Duration::hours(1));
    assert_eq!(service.purge_expired().await.unwrap(), 1);

    let err = service
        .validate(otp(&principal, issued.otp_code.as_deref().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, EcmsError::NotFound { .. }), "{err}");
}

/// Issues `n` verification links at once and returns every token that
/// was handed out.
async fn issue_links_concurrently(
    service: &Arc<Service<RecordingNotifier>>,
    principal_id: Uuid,
    n: usize,
) -> Vec<String> {
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let service = Arc::clone(service);
            tokio::spawn(async move {
                service
                    .issue(
                        principal_id,
                        TokenKind::EmailVerification,
                        IssueMode::Link,
                        Duration::hours(1),
                    )
                    .await
            })
        })
        .collect();

    let mut tokens = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(issued) => tokens.push(issued.token),
            Err(e) => assert!(e.is_retryable(), "{e}"),
        }
    }
    tokens
}

/// Validates every token and counts the ones that were still active.
async fn count_active(service: &Service<RecordingNotifier>, tokens: Vec<String>) -> usize {
    let mut active = 0;
    for raw in tokens {
        match service.validate(TokenCredential::Link(raw)).await {
            Ok(_) => active += 1,
            Err(e) => assert!(matches!(e, EcmsError::AlreadyUsed), "{e}"),
        }
    }
    active
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_keeps_one_active_token() {
    let (service, _clock, principal, _) = setup().await;
    let service = Arc::new(service);

    let first = issue_links_concurrently(&service, principal.id, 8).await;
    assert!(!first.is_empty());
    // Validation consumes the active token, so the next round re-issues
    // with nothing left to invalidate.
    assert_eq!(count_active(&service, first).await, 1);

    let second = issue_links_concurrently(&service, principal.id, 8).await;
    assert!(!second.is_empty());
    assert_eq!(count_active(&service, second).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resets_with_one_permit_apply_once() {
    let (service, _clock, principal, _) = setup().await;
    let service = Arc::new(service);

    let issued = service
        .issue_token(principal.id, TokenKind::PasswordReset)
        .await
        .unwrap();
    let permit = service
        .validate(otp(&principal, issued.otp_code.as_deref().unwrap()))
        .await
        .unwrap()
        .permit
        .unwrap();

    let handles: Vec<_> = ["first new password", "second new password"]
        .into_iter()
        .map(|new_password| {
            let service = Arc::clone(&service);
            let permit = permit.clone();
            tokio::spawn(async move {
                (new_password, service.reset_password(&permit, new_password).await)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            (new_password, Ok(updated)) => winners.push((new_password, updated)),
            (_, Err(e)) => assert!(
                matches!(e, EcmsError::AlreadyUsed) || e.is_retryable(),
                "{e}"
            ),
        }
    }
    assert_eq!(winners.len(), 1);
    let (new_password, updated) = &winners[0];
    assert!(password::verify_password(new_password, &updated.password_hash, None).unwrap());
}
