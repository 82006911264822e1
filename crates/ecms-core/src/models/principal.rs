//! Principal (account) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrincipalRole {
    PlatformOperator,
    TenantAdmin,
    Editor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    /// Lower-cased, unique across all principals of all tenants.
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: PrincipalRole,
    /// `None` for platform operators.
    pub tenant_id: Option<Uuid>,
    pub is_active: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn is_platform_operator(&self) -> bool {
        self.tenant_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrincipal {
    pub email: String,
    pub full_name: String,
    /// Argon2id PHC string; plaintext passwords never reach storage.
    pub password_hash: String,
    pub role: PrincipalRole,
    pub tenant_id: Option<Uuid>,
    pub email_verified: bool,
}
