//! Conditional record operations against one resolved tenant location.
//!
//! The version token is Postgres `xmin`: it advances on every committed write
//! of a row and is never assignable by the caller, which is exactly the
//! compare-and-swap primitive the etag contract needs. TTL expiry is applied
//! with the database clock; an expired row is logically absent to every read
//! even while physically present, and only the sweeper removes it.

use crate::error::{StateError, StateResult};
use crate::ledger::{ResourceClaim, ResourceLedger};
use crate::registry;
use crate::resolver::Location;
use sqlx::{PgConnection, Row};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A stored value along with its current version token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub value: Vec<u8>,
    pub etag: String,
}

/// Executes conditional reads and writes against one resolved location.
///
/// All operations run on a caller-supplied connection so a transactional
/// batch can thread one transaction through many record stores.
pub struct RecordStore {
    location: Location,
    ledger: Arc<ResourceLedger>,
}

impl RecordStore {
    pub fn new(location: Location, ledger: Arc<ResourceLedger>) -> Self {
        Self { location, ledger }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Fetch a record by key. Expired rows read as absent.
    pub async fn get(&self, conn: &mut PgConnection, key: &str) -> StateResult<Option<Record>> {
        let sql = format!(
            "SELECT value::text AS value, xmin::text AS etag \
             FROM {} \
             WHERE key = $1 \
               AND (expires_at IS NULL OR expires_at > CURRENT_TIMESTAMP)",
            self.location.qualified()
        );

        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|err| self.classify(err))?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value")?;
                let etag: String = row.try_get("etag")?;
                Ok(Some(Record {
                    value: value.into_bytes(),
                    etag,
                }))
            }
            None => {
                debug!(key, location = %self.location.qualified(), "state not found");
                Ok(None)
            }
        }
    }

    /// Insert or update a record, provisioning the tenant's storage objects
    /// on first use.
    ///
    /// Without an etag this is an unconditional upsert. With an etag, only
    /// the row matching both key and version is updated, and only while not
    /// expired; zero matched rows is an etag mismatch. A missing-relation
    /// failure invalidates the gate claims before propagating, so the next
    /// call re-provisions instead of trusting a stale ledger.
    pub async fn upsert(
        &self,
        conn: &mut PgConnection,
        key: &str,
        value: &[u8],
        etag: Option<&str>,
        ttl_seconds: i64,
    ) -> StateResult<()> {
        let claims = self.ensure_resources(conn).await?;

        match self.insert_or_update(conn, key, value, etag, ttl_seconds).await {
            Err(err) => {
                if matches!(err, StateError::ResourceMissing(_)) {
                    for claim in &claims {
                        claim.invalidate().await;
                    }
                }
                Err(err)
            }
            ok => ok,
        }
    }

    /// Delete a record, conditionally when an etag is supplied.
    ///
    /// Without an etag, absence of the key is not an error. With an etag,
    /// zero deleted rows is an etag mismatch.
    pub async fn delete(
        &self,
        conn: &mut PgConnection,
        key: &str,
        etag: Option<&str>,
    ) -> StateResult<()> {
        match etag {
            None => {
                let sql = format!("DELETE FROM {} WHERE key = $1", self.location.qualified());
                let result = sqlx::query(&sql)
                    .bind(key)
                    .execute(&mut *conn)
                    .await
                    .map_err(|err| self.classify(err))?;
                debug!(key, deleted = result.rows_affected(), "unconditional delete");
                Ok(())
            }
            Some(tag) => {
                let version = parse_etag(tag)?;
                let sql = format!(
                    "DELETE FROM {} WHERE key = $1 AND xmin::text = $2",
                    self.location.qualified()
                );
                let result = sqlx::query(&sql)
                    .bind(key)
                    .bind(&version)
                    .execute(&mut *conn)
                    .await
                    .map_err(|err| self.classify(err))?;
                if result.rows_affected() == 0 {
                    debug!(key, etag = %version, "etag present but no rows deleted");
                    return Err(StateError::EtagMismatch);
                }
                Ok(())
            }
        }
    }

    /// Run the schema and table provisioning DDL under the gate, returning
    /// the claims to invalidate should a later write find the objects gone.
    async fn ensure_resources(
        &self,
        conn: &mut PgConnection,
    ) -> StateResult<[ResourceClaim; 2]> {
        let schema_claim = {
            let conn = &mut *conn;
            self.ledger
                .ensure_exists(&self.location.schema_resource_key(), move || async move {
                    self.create_schema(conn).await
                })
                .await?
        };
        let table_claim = {
            let conn = &mut *conn;
            self.ledger
                .ensure_exists(&self.location.table_resource_key(), move || async move {
                    self.create_table(conn).await
                })
                .await?
        };
        Ok([schema_claim, table_claim])
    }

    async fn create_schema(&self, conn: &mut PgConnection) -> StateResult<()> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.location.quoted_schema()
        );
        sqlx::query(&sql).execute(&mut *conn).await?;
        debug!(schema = %self.location.schema(), "schema created");
        Ok(())
    }

    async fn create_table(&self, conn: &mut PgConnection) -> StateResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
                key text NOT NULL PRIMARY KEY, \
                value jsonb NOT NULL, \
                inserted_at timestamptz NOT NULL DEFAULT now(), \
                updated_at timestamptz NULL, \
                expires_at timestamptz NULL \
            )",
            self.location.qualified()
        );
        sqlx::query(&sql).execute(&mut *conn).await?;
        registry::register_tenant(conn, &self.location).await?;
        debug!(table = %self.location.qualified(), "table created and registered");
        Ok(())
    }

    async fn insert_or_update(
        &self,
        conn: &mut PgConnection,
        key: &str,
        value: &[u8],
        etag: Option<&str>,
        ttl_seconds: i64,
    ) -> StateResult<()> {
        // Short id to correlate interleaved concurrent writes in the logs.
        let correlation = correlation_id();
        let value = String::from_utf8_lossy(value);
        let expires = expiry_expression(ttl_seconds);

        let rows_affected = match etag {
            None => {
                let sql = format!(
                    "INSERT INTO {table} (key, value, expires_at) \
                     VALUES ($1, $2::jsonb, {expires}) \
                     ON CONFLICT (key) DO UPDATE SET \
                        value = $2::jsonb, \
                        updated_at = CURRENT_TIMESTAMP, \
                        expires_at = {expires}",
                    table = self.location.qualified(),
                );
                debug!(%correlation, key, "unconditional upsert");
                sqlx::query(&sql)
                    .bind(key)
                    .bind(value.as_ref())
                    .execute(&mut *conn)
                    .await
                    .map_err(|err| self.classify(err))?
                    .rows_affected()
            }
            Some(tag) => {
                let version = parse_etag(tag)?;
                let sql = format!(
                    "UPDATE {table} SET \
                        value = $2::jsonb, \
                        updated_at = CURRENT_TIMESTAMP, \
                        expires_at = {expires} \
                     WHERE key = $1 \
                       AND xmin::text = $3 \
                       AND (expires_at IS NULL OR expires_at > CURRENT_TIMESTAMP)",
                    table = self.location.qualified(),
                );
                debug!(%correlation, key, etag = %version, "conditional update");
                sqlx::query(&sql)
                    .bind(key)
                    .bind(value.as_ref())
                    .bind(&version)
                    .execute(&mut *conn)
                    .await
                    .map_err(|err| self.classify(err))?
                    .rows_affected()
            }
        };

        if rows_affected == 0 && etag.is_some() {
            debug!(%correlation, key, "etag present but no rows modified");
            return Err(StateError::EtagMismatch);
        }
        debug!(%correlation, key, rows_affected, "row inserted/updated");
        Ok(())
    }

    /// Map an undefined-relation failure to `ResourceMissing` for this
    /// location; everything else stays a database error.
    fn classify(&self, err: sqlx::Error) -> StateError {
        if StateError::is_missing_relation(&err) {
            StateError::ResourceMissing(self.location.qualified())
        } else {
            err.into()
        }
    }
}

/// Validate a caller-supplied etag and canonicalize it to the decimal form
/// `xmin::text` produces. xmin is a 32-bit xid, so anything that does not
/// parse as `u32` can never match.
fn parse_etag(etag: &str) -> StateResult<String> {
    etag.parse::<u32>()
        .map(|version| version.to_string())
        .map_err(|_| StateError::EtagInvalid)
}

/// SQL fragment computing the expiry timestamp on the database clock.
/// A non-positive TTL means no expiry.
fn expiry_expression(ttl_seconds: i64) -> String {
    if ttl_seconds > 0 {
        format!("CURRENT_TIMESTAMP + make_interval(secs => {ttl_seconds})")
    } else {
        "NULL".to_string()
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..9].to_string()
}
