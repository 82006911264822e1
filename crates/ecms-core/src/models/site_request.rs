//! Site creation request domain model.
//!
//! Applicants submit a request for a new municipal site; a platform
//! operator then approves (which provisions the tenant) or rejects it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a [`SiteCreationRequest`].
///
/// `Pending -> Approved` and `Pending -> Rejected` are the only
/// transitions; both targets are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SiteRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl SiteRequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(self, next: SiteRequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCreationRequest {
    pub id: Uuid,
    pub site_name: String,
    pub referent_name: String,
    pub referent_email: String,
    pub referent_phone: Option<String>,
    pub motivation: Option<String>,
    pub status: SiteRequestStatus,
    /// Tenant created by the approval. Written once, on approval only.
    pub tenant_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    /// Free-form operator notes recorded with the decision.
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Fields accepted from the public submission form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSiteRequest {
    pub site_name: String,
    pub referent_name: String,
    pub referent_email: String,
    pub referent_phone: Option<String>,
    pub motivation: Option<String>,
}
