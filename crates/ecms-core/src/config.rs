//! Platform-wide configuration, loaded once at startup and shared by
//! reference.

use serde::{Deserialize, Serialize};

use crate::models::service_catalog::{ServiceTemplate, baseline_services};

/// Subdomains that never resolve to a tenant.
pub const RESERVED_SUBDOMAINS: &[&str] = &["www", "api", "admin", "static", "media", "mail", "cdn"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Parent domain under which every tenant gets a subdomain.
    pub platform_domain: String,
    /// Scheme used when building public site URLs.
    pub public_scheme: String,
    pub reserved_subdomains: Vec<String>,
    /// Catalog seeded into every newly provisioned tenant.
    pub default_services: Vec<ServiceTemplate>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            platform_domain: "ecms.cm".into(),
            public_scheme: "https".into(),
            reserved_subdomains: RESERVED_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            default_services: baseline_services(),
        }
    }
}

impl PlatformConfig {
    /// `{slug}.{platform_domain}`.
    pub fn tenant_domain(&self, slug: &str) -> String {
        format!("{slug}.{}", self.platform_domain)
    }

    pub fn tenant_url(&self, slug: &str) -> String {
        format!("{}://{}", self.public_scheme, self.tenant_domain(slug))
    }

    pub fn is_reserved(&self, label: &str) -> bool {
        self.reserved_subdomains.iter().any(|r| r == label)
    }
}
