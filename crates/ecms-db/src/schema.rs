//! Schema definitions and migration runner for SurrealDB.
//!
//! Every table is SCHEMAFULL. UUIDs are stored as strings and enums as
//! strings guarded by ASSERT. Uniqueness of slugs, domains, emails and
//! token hashes is enforced here, by UNIQUE indexes, not by callers.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenants (global scope)
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD domain ON TABLE tenant TYPE string;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['Active', 'Suspended', 'Inactive'];
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD validated_at ON TABLE tenant TYPE option<datetime>;
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;
DEFINE INDEX idx_tenant_domain ON TABLE tenant COLUMNS domain UNIQUE;

-- =======================================================================
-- Site creation requests (global scope)
-- =======================================================================
DEFINE TABLE site_request SCHEMAFULL;
DEFINE FIELD site_name ON TABLE site_request TYPE string;
DEFINE FIELD referent_name ON TABLE site_request TYPE string;
DEFINE FIELD referent_email ON TABLE site_request TYPE string;
DEFINE FIELD referent_phone ON TABLE site_request TYPE option<string>;
DEFINE FIELD motivation ON TABLE site_request TYPE option<string>;
DEFINE FIELD status ON TABLE site_request TYPE string \
    ASSERT $value IN ['Pending', 'Approved', 'Rejected'];
DEFINE FIELD tenant_id ON TABLE site_request TYPE option<string>;
DEFINE FIELD rejection_reason ON TABLE site_request \
    TYPE option<string>;
DEFINE FIELD admin_notes ON TABLE site_request TYPE option<string>;
DEFINE FIELD created_at ON TABLE site_request TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD decided_at ON TABLE site_request TYPE option<datetime>;
DEFINE INDEX idx_site_request_status ON TABLE site_request \
    COLUMNS status, created_at;

-- =======================================================================
-- Principals (global scope, optionally bound to a tenant)
-- =======================================================================
DEFINE TABLE principal SCHEMAFULL;
DEFINE FIELD email ON TABLE principal TYPE string;
DEFINE FIELD full_name ON TABLE principal TYPE string;
DEFINE FIELD password_hash ON TABLE principal TYPE string;
DEFINE FIELD role ON TABLE principal TYPE string \
    ASSERT $value IN ['PlatformOperator', 'TenantAdmin', 'Editor'];
DEFINE FIELD tenant_id ON TABLE principal TYPE option<string>;
DEFINE FIELD is_active ON TABLE principal TYPE bool DEFAULT true;
DEFINE FIELD email_verified ON TABLE principal TYPE bool \
    DEFAULT false;
DEFINE FIELD created_at ON TABLE principal TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE principal TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_principal_email ON TABLE principal \
    COLUMNS email UNIQUE;
DEFINE INDEX idx_principal_tenant ON TABLE principal \
    COLUMNS tenant_id;

-- =======================================================================
-- Service catalog (tenant scope)
-- =======================================================================
DEFINE TABLE service_catalog_entry SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE service_catalog_entry TYPE string;
DEFINE FIELD name ON TABLE service_catalog_entry TYPE string;
DEFINE FIELD description ON TABLE service_catalog_entry TYPE string;
DEFINE FIELD position ON TABLE service_catalog_entry TYPE int;
DEFINE FIELD active ON TABLE service_catalog_entry TYPE bool \
    DEFAULT true;
DEFINE FIELD created_at ON TABLE service_catalog_entry TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_service_catalog_tenant_name \
    ON TABLE service_catalog_entry COLUMNS tenant_id, name UNIQUE;

-- =======================================================================
-- Credential tokens (principal scope)
-- =======================================================================
DEFINE TABLE credential_token SCHEMAFULL;
DEFINE FIELD principal_id ON TABLE credential_token TYPE string;
DEFINE FIELD kind ON TABLE credential_token TYPE string \
    ASSERT $value IN ['EmailVerification', 'PasswordReset'];
DEFINE FIELD token_hash ON TABLE credential_token TYPE string;
DEFINE FIELD otp_code ON TABLE credential_token TYPE option<string>;
DEFINE FIELD created_at ON TABLE credential_token TYPE datetime;
DEFINE FIELD expires_at ON TABLE credential_token TYPE datetime;
DEFINE FIELD used ON TABLE credential_token TYPE bool DEFAULT false;
DEFINE FIELD verified ON TABLE credential_token TYPE bool \
    DEFAULT false;
DEFINE INDEX idx_credential_token_hash ON TABLE credential_token \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_credential_token_principal_kind \
    ON TABLE credential_token COLUMNS principal_id, kind, used;

-- One row per (principal, kind), rewritten by every issuance so that
-- concurrent issuances for the same pair conflict on commit.
DEFINE TABLE credential_token_slot SCHEMAFULL;
DEFINE FIELD token_id ON TABLE credential_token_slot TYPE string;
DEFINE FIELD issued_at ON TABLE credential_token_slot TYPE datetime;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
