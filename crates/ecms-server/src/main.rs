//! E-CMS Server: Application entry point.

mod config;
mod notifier;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use ecms_auth::{AuthConfig, CredentialTokenService, password};
use ecms_core::clock::{Clock, SystemClock};
use ecms_core::error::EcmsError;
use ecms_core::models::principal::{CreatePrincipal, PrincipalRole};
use ecms_core::models::site_request::SiteRequestStatus;
use ecms_core::repository::{Pagination, PrincipalRepository, Upserted};
use ecms_db::repository::{
    SurrealCredentialTokenRepository, SurrealPrincipalRepository, SurrealProvisioningStore,
    SurrealSiteRequestRepository, SurrealTenantRepository,
};
use ecms_db::{DbError, DbManager};
use ecms_tenancy::{RequestReviewWorkflow, TenantProvisioningService};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, OperatorBootstrap, ServerConfig};
use crate::notifier::TracingNotifier;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Ecms(#[from] EcmsError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ecms=info")),
        )
        .json()
        .init();

    info!("Starting E-CMS server...");

    match run().await {
        Ok(()) => {
            info!("E-CMS server stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "E-CMS server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = ServerConfig::from_env()?;

    let manager = DbManager::connect(&config.db).await.map_err(DbError::from)?;
    let db = manager.client();
    ecms_db::run_migrations(db).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let platform = Arc::new(config.platform.clone());

    if let Some(operator) = &config.operator {
        let principals = SurrealPrincipalRepository::new(db.clone());
        ensure_operator(&principals, operator, &config.auth).await?;
    }

    let workflow = RequestReviewWorkflow::new(TenantProvisioningService::new(
        SurrealTenantRepository::new(db.clone()),
        SurrealSiteRequestRepository::new(db.clone()),
        SurrealProvisioningStore::new(db.clone()),
        TracingNotifier,
        clock.clone(),
        platform.clone(),
        config.auth.clone(),
    ));
    let tokens = CredentialTokenService::new(
        SurrealPrincipalRepository::new(db.clone()),
        SurrealCredentialTokenRepository::new(db.clone()),
        TracingNotifier,
        clock,
        config.auth.clone(),
    );

    let queue = workflow
        .list_requests(Some(SiteRequestStatus::Pending), Pagination { offset: 0, limit: 1 })
        .await?;
    info!(
        platform_domain = %platform.platform_domain,
        pending_requests = queue.total,
        "E-CMS server ready"
    );

    let mut purge = tokio::time::interval(Duration::from_secs(config.token_purge_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = purge.tick() => {
                if let Err(e) = tokens.purge_expired().await {
                    warn!(error = %e, "Expired token purge failed");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

/// Make sure the configured platform operator account exists.
async fn ensure_operator<P: PrincipalRepository>(
    principals: &P,
    operator: &OperatorBootstrap,
    auth: &AuthConfig,
) -> Result<(), StartupError> {
    let password_hash = password::hash_password(&operator.password, auth.pepper.as_deref())
        .map_err(EcmsError::from)?;

    let outcome = principals
        .upsert_by_email(CreatePrincipal {
            email: operator.email.clone(),
            full_name: operator.full_name.clone(),
            password_hash,
            role: PrincipalRole::PlatformOperator,
            tenant_id: None,
            email_verified: true,
        })
        .await?;

    match outcome {
        Upserted::Created(p) => info!(principal_id = %p.id, "Platform operator created"),
        Upserted::Existing(p) if p.role == PrincipalRole::PlatformOperator => {
            info!(principal_id = %p.id, "Platform operator already present")
        }
        Upserted::Existing(p) => warn!(
            principal_id = %p.id,
            "Operator email belongs to a non-operator account, leaving it unchanged"
        ),
    }
    Ok(())
}
