//! Configuration types shared across crates.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Component property carrying the backing-store connection string.
pub const CONNECTION_STRING_PROPERTY: &str = "connectionString";
/// Component property selecting the tenant mode (`schema` or `table`).
pub const TENANT_PROPERTY: &str = "tenant";
/// Component property overriding the default schema name.
pub const SCHEMA_PROPERTY: &str = "schema";
/// Component property overriding the default table name.
pub const TABLE_PROPERTY: &str = "table";
/// Component property overriding the connection pool size.
pub const MAX_CONNECTIONS_PROPERTY: &str = "maxConnections";

const DEFAULT_SCHEMA_NAME: &str = "public";
const DEFAULT_TABLE_NAME: &str = "state";

/// How tenants map onto physical storage objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantMode {
    /// Each tenant gets its own schema; all tenants share the table name.
    Schema,
    /// All tenants share a schema; each tenant gets its own table.
    Table,
}

impl FromStr for TenantMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "schema" => Ok(Self::Schema),
            "table" => Ok(Self::Table),
            other => Err(ConfigError::InvalidTenantMode(other.to_string())),
        }
    }
}

impl fmt::Display for TenantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema => f.write_str("schema"),
            Self::Table => f.write_str("table"),
        }
    }
}

/// State store configuration, one per component instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub connection_string: String,
    /// Tenant isolation mode.
    pub tenant_mode: TenantMode,
    /// Schema name tenants resolve against (prefixed in schema mode).
    #[serde(default = "default_schema")]
    pub default_schema: String,
    /// Table name tenants resolve against (prefixed in table mode).
    #[serde(default = "default_table")]
    pub default_table: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long store initialization may wait for the sweeper to establish
    /// the shared tenant registry before failing.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA_NAME.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

impl StoreConfig {
    /// Build a store configuration from the host's component property map.
    ///
    /// `connectionString` and `tenant` are mandatory; `schema` and `table`
    /// fall back to `public` / `state`.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let connection_string = properties
            .get(CONNECTION_STRING_PROPERTY)
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingProperty(CONNECTION_STRING_PROPERTY))?
            .clone();

        let tenant_mode = properties
            .get(TENANT_PROPERTY)
            .ok_or(ConfigError::MissingProperty(TENANT_PROPERTY))?
            .parse::<TenantMode>()?;

        let default_schema = properties
            .get(SCHEMA_PROPERTY)
            .cloned()
            .unwrap_or_else(default_schema);

        let default_table = properties
            .get(TABLE_PROPERTY)
            .cloned()
            .unwrap_or_else(default_table);

        let max_connections = match properties.get(MAX_CONNECTIONS_PROPERTY) {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|err| ConfigError::InvalidProperty {
                    key: MAX_CONNECTIONS_PROPERTY,
                    message: err.to_string(),
                })?,
            None => default_max_connections(),
        };

        Ok(Self {
            connection_string,
            tenant_mode,
            default_schema,
            default_table,
            max_connections,
            handshake_timeout_secs: default_handshake_timeout_secs(),
        })
    }

    /// Create a test configuration against a throwaway database.
    ///
    /// **For testing only.**
    pub fn for_testing(connection_string: impl Into<String>, tenant_mode: TenantMode) -> Self {
        Self {
            connection_string: connection_string.into(),
            tenant_mode,
            default_schema: default_schema(),
            default_table: default_table(),
            max_connections: default_max_connections(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

/// Expiry sweeper configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweep passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    5
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Top-level configuration for the `silod` binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties_minimal() {
        let config = StoreConfig::from_properties(&properties(&[
            ("connectionString", "postgres://localhost/db"),
            ("tenant", "table"),
        ]))
        .unwrap();

        assert_eq!(config.tenant_mode, TenantMode::Table);
        assert_eq!(config.default_schema, "public");
        assert_eq!(config.default_table, "state");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_from_properties_overrides() {
        let config = StoreConfig::from_properties(&properties(&[
            ("connectionString", "postgres://localhost/db"),
            ("tenant", "schema"),
            ("schema", "tenants"),
            ("table", "records"),
            ("maxConnections", "12"),
        ]))
        .unwrap();

        assert_eq!(config.tenant_mode, TenantMode::Schema);
        assert_eq!(config.default_schema, "tenants");
        assert_eq!(config.default_table, "records");
        assert_eq!(config.max_connections, 12);
    }

    #[test]
    fn test_missing_connection_string_rejected() {
        let err = StoreConfig::from_properties(&properties(&[("tenant", "table")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty("connectionString")));
    }

    #[test]
    fn test_empty_connection_string_rejected() {
        let err = StoreConfig::from_properties(&properties(&[
            ("connectionString", ""),
            ("tenant", "table"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty("connectionString")));
    }

    #[test]
    fn test_missing_tenant_mode_rejected() {
        let err = StoreConfig::from_properties(&properties(&[(
            "connectionString",
            "postgres://localhost/db",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty("tenant")));
    }

    #[test]
    fn test_unrecognized_tenant_mode_rejected() {
        let err = StoreConfig::from_properties(&properties(&[
            ("connectionString", "postgres://localhost/db"),
            ("tenant", "database"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTenantMode(mode) if mode == "database"));
    }

    #[test]
    fn test_invalid_max_connections_rejected() {
        let err = StoreConfig::from_properties(&properties(&[
            ("connectionString", "postgres://localhost/db"),
            ("tenant", "table"),
            ("maxConnections", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidProperty {
                key: "maxConnections",
                ..
            }
        ));
    }

    #[test]
    fn test_tenant_mode_display_round_trip() {
        for mode in [TenantMode::Schema, TenantMode::Table] {
            assert_eq!(mode.to_string().parse::<TenantMode>().unwrap(), mode);
        }
    }
}
