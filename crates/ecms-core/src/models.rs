//! Domain models for E-CMS.
//!
//! These are the core types shared across all crates.

pub mod credential_token;
pub mod principal;
pub mod provisioning;
pub mod service_catalog;
pub mod site_request;
pub mod tenant;
