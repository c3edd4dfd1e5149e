//! Tenant resolution: per-request metadata → concrete storage location.

use crate::error::{StateError, StateResult};
use silo_core::{StoreConfig, TenantMode};
use std::collections::HashMap;

/// Metadata key carrying the tenant id on every request.
pub const TENANT_ID_KEY: &str = "tenantId";

/// The concrete (schema, table) pair a tenant's operations map to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    schema: String,
    table: String,
}

impl Location {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Quoted schema identifier, safe to interpolate into DDL/DML.
    pub fn quoted_schema(&self) -> String {
        quote_ident(&self.schema)
    }

    /// Quoted, fully qualified `"schema"."table"` name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Key identifying this tenant's storage objects in the shared registry.
    /// This is also the delete target the sweeper interpolates, so it is the
    /// quoted qualified name rather than a synthetic id.
    pub fn tenant_key(&self) -> String {
        self.qualified()
    }

    /// Gate key for the schema object.
    pub fn schema_resource_key(&self) -> String {
        format!("S:{}", self.schema)
    }

    /// Gate key for the table object.
    pub fn table_resource_key(&self) -> String {
        format!("T:{}-{}", self.schema, self.table)
    }
}

/// Quote an identifier for interpolation, doubling any embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Pure derivation of storage locations from configuration plus per-request
/// metadata. No I/O happens here.
#[derive(Clone, Debug)]
pub struct TenantResolver {
    mode: TenantMode,
    default_schema: String,
    default_table: String,
}

impl TenantResolver {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            mode: config.tenant_mode,
            default_schema: config.default_schema.clone(),
            default_table: config.default_table.clone(),
        }
    }

    /// Resolve the storage location for one request.
    ///
    /// The tenant id comes from `metadata.tenantId`; a missing or empty id is
    /// a request-level error, never a default.
    pub fn resolve(&self, metadata: &HashMap<String, String>) -> StateResult<Location> {
        let tenant_id = metadata
            .get(TENANT_ID_KEY)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(StateError::MissingTenantId)?;

        Ok(match self.mode {
            TenantMode::Schema => Location::new(
                format!("{tenant_id}-{}", self.default_schema),
                self.default_table.clone(),
            ),
            TenantMode::Table => Location::new(
                self.default_schema.clone(),
                format!("{tenant_id}-{}", self.default_table),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(mode: TenantMode) -> TenantResolver {
        TenantResolver::new(&StoreConfig::for_testing("postgres://localhost/db", mode))
    }

    fn metadata(tenant_id: &str) -> HashMap<String, String> {
        HashMap::from([(TENANT_ID_KEY.to_string(), tenant_id.to_string())])
    }

    #[test]
    fn test_schema_mode_prefixes_schema() {
        let location = resolver(TenantMode::Schema).resolve(&metadata("acme")).unwrap();
        assert_eq!(location.schema(), "acme-public");
        assert_eq!(location.table(), "state");
        assert_eq!(location.qualified(), "\"acme-public\".\"state\"");
    }

    #[test]
    fn test_table_mode_prefixes_table() {
        let location = resolver(TenantMode::Table).resolve(&metadata("acme")).unwrap();
        assert_eq!(location.schema(), "public");
        assert_eq!(location.table(), "acme-state");
        assert_eq!(location.qualified(), "\"public\".\"acme-state\"");
    }

    #[test]
    fn test_missing_tenant_id_rejected() {
        let err = resolver(TenantMode::Table)
            .resolve(&HashMap::new())
            .unwrap_err();
        assert!(matches!(err, StateError::MissingTenantId));
    }

    #[test]
    fn test_empty_tenant_id_rejected() {
        let err = resolver(TenantMode::Schema).resolve(&metadata("")).unwrap_err();
        assert!(matches!(err, StateError::MissingTenantId));
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        let location = Location::new("ev\"il", "state");
        assert_eq!(location.quoted_schema(), "\"ev\"\"il\"");
    }

    #[test]
    fn test_resource_keys_distinguish_schema_and_table() {
        let location = Location::new("public", "acme-state");
        assert_eq!(location.schema_resource_key(), "S:public");
        assert_eq!(location.table_resource_key(), "T:public-acme-state");
    }
}
