//! Error types for the E-CMS system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EcmsError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// An operation was attempted on an entity whose lifecycle state
    /// does not allow it (e.g. approving a rejected request).
    #[error("Invalid state for {entity}: {reason}")]
    InvalidState { entity: String, reason: String },

    /// A uniqueness constraint was violated.
    #[error("Conflict: {entity} with this {field} already exists")]
    Conflict { entity: String, field: String },

    #[error("Credential has expired")]
    Expired,

    #[error("Credential has already been used")]
    AlreadyUsed,

    /// Retryable infrastructure failure (e.g. a transaction conflict).
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Tenant context missing or invalid")]
    TenantContext,
}

impl EcmsError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid_state(entity: &str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(entity: &str, field: &str) -> Self {
        Self::Conflict {
            entity: entity.into(),
            field: field.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this is a uniqueness violation on `entity.field`.
    pub fn is_conflict_on(&self, entity: &str, field: &str) -> bool {
        matches!(self, Self::Conflict { entity: e, field: f } if e == entity && f == field)
    }
}

pub type EcmsResult<T> = Result<T, EcmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(EcmsError::Transient("conflict".into()).is_retryable());
        assert!(!EcmsError::conflict("tenant", "slug").is_retryable());
        assert!(!EcmsError::Expired.is_retryable());
    }

    #[test]
    fn conflict_matches_entity_and_field() {
        let err = EcmsError::conflict("principal", "email");
        assert!(err.is_conflict_on("principal", "email"));
        assert!(!err.is_conflict_on("tenant", "slug"));
    }
}
