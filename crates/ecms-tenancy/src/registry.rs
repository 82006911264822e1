//! Host-based tenant resolution.
//!
//! Every inbound request is mapped to either a tenant scope or the
//! platform scope by looking at its `Host`. Resolution never fails: any
//! host that does not name an active tenant falls back to the platform
//! scope.

use std::sync::Arc;

use ecms_core::config::PlatformConfig;
use ecms_core::error::{EcmsError, EcmsResult};
use ecms_core::models::tenant::Tenant;
use ecms_core::repository::TenantRepository;
use tracing::{debug, warn};
use uuid::Uuid;

/// Local development hosts treated like the platform root.
const LOCAL_ROOTS: &[&str] = &["localhost", "127.0.0.1"];
const LOCAL_PARENT: &str = "localhost";

/// Classification of a normalized host, independent of storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKind {
    /// The platform itself (`ecms.cm`, `www.ecms.cm`, `localhost`, ...).
    PlatformRoot,
    /// A reserved subdomain such as `api` or `admin`.
    Reserved(String),
    /// A well-formed single label under a known parent.
    Candidate(String),
    /// Anything else: foreign domains, nested subdomains, bad labels.
    Foreign,
}

/// Lower-case, trim, drop a trailing dot and a `:port` suffix.
fn normalize(host: &str) -> String {
    let mut host = host.trim().to_ascii_lowercase();
    if let Some((name, port)) = host.rsplit_once(':')
        && !port.is_empty()
        && port.bytes().all(|b| b.is_ascii_digit())
    {
        host = name.to_string();
    }
    while host.ends_with('.') {
        host.pop();
    }
    host
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Classify `host` against the platform configuration.
pub fn parse_host(host: &str, config: &PlatformConfig) -> HostKind {
    let host = normalize(host);
    let platform = config.platform_domain.as_str();

    if host == platform
        || host == format!("www.{platform}")
        || LOCAL_ROOTS.contains(&host.as_str())
    {
        return HostKind::PlatformRoot;
    }

    let label = [platform, LOCAL_PARENT].iter().find_map(|parent| {
        host.strip_suffix(parent)
            .and_then(|rest| rest.strip_suffix('.'))
    });

    match label {
        Some(label) if is_valid_label(label) => {
            if config.is_reserved(label) {
                HostKind::Reserved(label.to_string())
            } else {
                HostKind::Candidate(label.to_string())
            }
        }
        _ => HostKind::Foreign,
    }
}

/// The scope a request runs in. Returned by value and passed explicitly.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Option<Tenant>,
    pub is_tenant_scoped: bool,
}

impl TenantContext {
    pub fn platform() -> Self {
        Self {
            tenant: None,
            is_tenant_scoped: false,
        }
    }

    pub fn tenant(tenant: Tenant) -> Self {
        Self {
            tenant: Some(tenant),
            is_tenant_scoped: true,
        }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant.as_ref().map(|t| t.id)
    }

    /// Guard for operations that only make sense on a tenant site.
    pub fn require_tenant(&self) -> EcmsResult<&Tenant> {
        self.tenant.as_ref().ok_or(EcmsError::TenantContext)
    }
}

/// Resolves hosts to tenant contexts.
pub struct TenantRegistry<R: TenantRepository> {
    tenants: R,
    config: Arc<PlatformConfig>,
}

impl<R: TenantRepository> TenantRegistry<R> {
    pub fn new(tenants: R, config: Arc<PlatformConfig>) -> Self {
        Self { tenants, config }
    }

    /// Map a request host to its context. Unknown, inactive or reserved
    /// subdomains, and storage errors, all yield the platform context.
    pub async fn resolve(&self, host: &str) -> TenantContext {
        let slug = match parse_host(host, &self.config) {
            HostKind::Candidate(slug) => slug,
            kind => {
                debug!(host = %host, ?kind, "Host resolved to platform");
                return TenantContext::platform();
            }
        };

        match self.tenants.find_active_by_slug(&slug).await {
            Ok(Some(tenant)) => {
                debug!(host = %host, tenant_id = %tenant.id, "Host resolved to tenant");
                TenantContext::tenant(tenant)
            }
            Ok(None) => {
                debug!(host = %host, slug = %slug, "No active tenant for subdomain");
                TenantContext::platform()
            }
            Err(e) => {
                warn!(
                    host = %host,
                    slug = %slug,
                    error = %e,
                    "Tenant lookup failed, using platform context"
                );
                TenantContext::platform()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(host: &str) -> HostKind {
        parse_host(host, &PlatformConfig::default())
    }

    #[test]
    fn platform_roots() {
        for host in [
            "ecms.cm",
            "www.ecms.cm",
            "localhost",
            "127.0.0.1",
            "ECMS.cm.",
            "localhost:3000",
        ] {
            assert_eq!(kind(host), HostKind::PlatformRoot, "{host}");
        }
    }

    #[test]
    fn candidates_under_both_parents() {
        assert_eq!(kind("kribi.ecms.cm"), HostKind::Candidate("kribi".into()));
        assert_eq!(kind("Kribi.ECMS.cm:443"), HostKind::Candidate("kribi".into()));
        assert_eq!(kind("ville-test.localhost:8000"), HostKind::Candidate("ville-test".into()));
        assert_eq!(kind(" kribi-1.ecms.cm. "), HostKind::Candidate("kribi-1".into()));
    }

    #[test]
    fn reserved_labels() {
        for label in ["api", "admin", "static", "media", "mail", "cdn"] {
            assert_eq!(kind(&format!("{label}.ecms.cm")), HostKind::Reserved(label.into()));
        }
        assert_eq!(kind("admin.localhost"), HostKind::Reserved("admin".into()));
    }

    #[test]
    fn foreign_and_malformed_hosts() {
        for host in [
            "",
            "example.com",
            "kribi.example.com",
            "a.b.ecms.cm",
            ".ecms.cm",
            "kri_bi.ecms.cm",
            "xecms.cm",
            "[::1]:8080",
        ] {
            assert_eq!(kind(host), HostKind::Foreign, "{host:?}");
        }
    }

    #[test]
    fn require_tenant_on_platform_context_fails() {
        let ctx = TenantContext::platform();
        assert!(!ctx.is_tenant_scoped);
        assert!(ctx.tenant_id().is_none());
        assert!(matches!(ctx.require_tenant(), Err(EcmsError::TenantContext)));
    }
}
