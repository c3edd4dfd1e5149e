//! Shared tenant metadata registry.
//!
//! One row per provisioned tenant location, stored in the backing database
//! itself so every process instance sees it. Rows are created idempotently at
//! first table provisioning and are updated exclusively by the expiry
//! sweeper; nothing here ever deletes them.

use crate::error::{StateError, StateResult};
use crate::resolver::Location;
use sqlx::{FromRow, PgConnection};
use time::OffsetDateTime;

/// Schema holding the shared registry.
pub const METADATA_SCHEMA: &str = "silo_metadata";
/// Registry table name.
pub const METADATA_TABLE: &str = "tenant";
/// Quoted, fully qualified registry table.
pub const QUALIFIED_REGISTRY: &str = r#""silo_metadata"."tenant""#;

/// One registered tenant location.
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    /// Quoted qualified name of the tenant's table; also the sweep target.
    pub tenant_key: String,
    pub schema_id: String,
    pub table_id: String,
    pub inserted_at: OffsetDateTime,
    pub last_swept_at: Option<OffsetDateTime>,
}

/// Create the registry schema, table, and sweep-order index if absent.
pub async fn create_registry(conn: &mut PgConnection) -> StateResult<()> {
    // One statement per round trip; multi-statement strings cannot be prepared.
    let statements = [
        format!("CREATE SCHEMA IF NOT EXISTS \"{METADATA_SCHEMA}\""),
        format!(
            "CREATE TABLE IF NOT EXISTS {QUALIFIED_REGISTRY} ( \
                tenant_key text NOT NULL PRIMARY KEY, \
                schema_id text NOT NULL, \
                table_id text NOT NULL, \
                inserted_at timestamptz NOT NULL DEFAULT now(), \
                last_swept_at timestamptz NULL \
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS tenant_last_swept_at_idx \
             ON {QUALIFIED_REGISTRY} (last_swept_at ASC NULLS FIRST)"
        ),
    ];
    for sql in statements {
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Record a tenant location; a conflict on an existing key is a no-op.
pub async fn register_tenant(conn: &mut PgConnection, location: &Location) -> StateResult<()> {
    let sql = format!(
        "INSERT INTO {QUALIFIED_REGISTRY} (tenant_key, schema_id, table_id) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (tenant_key) DO NOTHING"
    );
    sqlx::query(&sql)
        .bind(location.tenant_key())
        .bind(location.schema())
        .bind(location.table())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The single tenant with the oldest (or never-set) `last_swept_at`.
pub async fn next_sweep_candidate(conn: &mut PgConnection) -> StateResult<Option<TenantRow>> {
    let sql = format!(
        "SELECT tenant_key, schema_id, table_id, inserted_at, last_swept_at \
         FROM {QUALIFIED_REGISTRY} \
         ORDER BY last_swept_at ASC NULLS FIRST \
         LIMIT 1"
    );
    Ok(sqlx::query_as::<_, TenantRow>(&sql)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Physically delete all expired rows from one tenant's table.
pub async fn purge_expired(conn: &mut PgConnection, tenant_key: &str) -> StateResult<u64> {
    // tenant_key is the quoted qualified name recorded at provisioning time.
    let sql = format!(
        "DELETE FROM {tenant_key} \
         WHERE expires_at IS NOT NULL AND expires_at < CURRENT_TIMESTAMP"
    );
    let result = sqlx::query(&sql).execute(&mut *conn).await.map_err(|err| {
        if StateError::is_missing_relation(&err) {
            StateError::ResourceMissing(tenant_key.to_string())
        } else {
            err.into()
        }
    })?;
    Ok(result.rows_affected())
}

/// Stamp a tenant as swept now, whether or not anything was deleted, so the
/// round-robin ordering keeps advancing.
pub async fn mark_swept(conn: &mut PgConnection, tenant_key: &str) -> StateResult<()> {
    let sql = format!(
        "UPDATE {QUALIFIED_REGISTRY} SET last_swept_at = CURRENT_TIMESTAMP WHERE tenant_key = $1"
    );
    sqlx::query(&sql).bind(tenant_key).execute(&mut *conn).await?;
    Ok(())
}
