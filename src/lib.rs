// Tenantry - schema-per-tenant routing for PostgreSQL backends
//
// This library maps each inbound request to a database session bound to the
// requesting tenant's namespace, provisioning namespaces on first use and
// caching one connection pool per namespace.

// Re-export core functionality
pub use tenantry_core::*;

// Re-export the supporting crates
pub use tenantry_config;
pub use tenantry_log;
pub use tenantry_schema;

pub use tenantry_config::{ConfigError, DatabaseSettings, ResolutionSettings, TenancyConfig};
pub use tenantry_log::LogConfig;
pub use tenantry_schema::{
    ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition, NamespaceName,
    ReferentialAction, SchemaCloner, SchemaDefinition, SchemaError, TableDefinition, TableScope,
};

/// Install the global log subscriber from `config.log`.
pub fn init_logging(config: &TenancyConfig) -> Result<(), tenantry_log::LogError> {
    tenantry_log::init(&config.log)
}

// Prelude for common imports
pub mod prelude {
    pub use crate::init_logging;
    pub use tenantry_core::prelude::*;
    pub use tenantry_log::LogConfig;
}
