//! E-CMS Tenancy: host-based tenant resolution, tenant provisioning and
//! the site request review workflow.

pub mod provisioning;
pub mod registry;
pub mod slug;
pub mod workflow;

pub use ecms_core::models::site_request::CreateSiteRequest as SubmitSiteRequest;
pub use provisioning::{DEFAULT_REJECTION_REASON, ProvisionResult, TenantProvisioningService};
pub use registry::{HostKind, TenantContext, TenantRegistry, parse_host};
pub use workflow::RequestReviewWorkflow;
