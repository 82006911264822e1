//! SurrealDB repository implementations.

use std::collections::HashMap;

use surrealdb_types::SurrealValue;

use crate::error::DbError;

mod credential_token;
mod principal;
mod provisioning;
mod service_catalog;
mod site_request;
mod tenant;

pub use credential_token::SurrealCredentialTokenRepository;
pub use principal::SurrealPrincipalRepository;
pub use provisioning::SurrealProvisioningStore;
pub use service_catalog::SurrealServiceCatalogRepository;
pub use site_request::SurrealSiteRequestRepository;
pub use tenant::SurrealTenantRepository;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Turns the per-statement errors of a failed multi-statement query into
/// one classified error.
///
/// When a transaction aborts, every statement reports an error, and most
/// of them only say that the transaction failed. Joining all messages in
/// statement order keeps the one that names the real cause.
pub(crate) fn transaction_failure(errors: HashMap<usize, surrealdb::Error>) -> DbError {
    let mut errors: Vec<_> = errors.into_iter().collect();
    errors.sort_by_key(|(index, _)| *index);
    let message = errors
        .into_iter()
        .map(|(index, e)| format!("[{index}] {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    DbError::from_write_failure(message)
}
