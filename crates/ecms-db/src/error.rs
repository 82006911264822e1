//! Database-specific error types and conversions.

use ecms_core::error::EcmsError;

/// Unique indexes whose violation is reported as a domain conflict,
/// as `(index, entity, field)`.
const UNIQUE_INDEXES: &[(&str, &str, &str)] = &[
    ("idx_tenant_slug", "tenant", "slug"),
    ("idx_tenant_domain", "tenant", "domain"),
    ("idx_principal_email", "principal", "email"),
    ("idx_credential_token_hash", "credential_token", "token_hash"),
];

/// Marker thrown by guarded transactions when the target row has left
/// the state the transaction expects.
pub(crate) const NOT_PENDING_MARKER: &str = "site_request_not_pending";

/// Thrown when a credential token was used before the transaction that
/// spends it could commit.
pub(crate) const TOKEN_SPENT_MARKER: &str = "credential_token_spent";

/// Thrown when the principal a transaction writes to does not exist.
pub(crate) const PRINCIPAL_MISSING_MARKER: &str = "principal_missing";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated on {entity}.{field}")]
    Conflict { entity: String, field: String },

    #[error("Invalid state for {entity}: {reason}")]
    InvalidState { entity: String, reason: String },

    /// A write or transaction failed for a reason not tied to the data,
    /// typically a concurrent write conflict. Retrying may succeed.
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

impl DbError {
    /// Classifies the error message(s) of a failed write.
    pub fn from_write_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if let Some((_, entity, field)) = UNIQUE_INDEXES
            .iter()
            .find(|(index, _, _)| message.contains(index))
        {
            return Self::Conflict {
                entity: (*entity).into(),
                field: (*field).into(),
            };
        }
        if message.contains(NOT_PENDING_MARKER) {
            return Self::InvalidState {
                entity: "site_request".into(),
                reason: "request is no longer pending".into(),
            };
        }
        Self::Transaction(message)
    }
}

pub(crate) fn decode_uuid(value: &str, what: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {what} UUID: {e}")))
}

impl From<DbError> for EcmsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EcmsError::NotFound { entity, id },
            DbError::Conflict { entity, field } => EcmsError::Conflict { entity, field },
            DbError::InvalidState { entity, reason } => EcmsError::InvalidState { entity, reason },
            DbError::Transaction(message) => EcmsError::Transient(message),
            other => EcmsError::Database(other.to_string()),
        }
    }
}
