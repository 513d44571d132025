// Configuration management for tenantry

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{
    DatabaseSettings, DefaultTenantSettings, ENV_PREFIX, ResolutionSettings, TenancyConfig,
    TenantDefaults,
};
pub use tenantry_log::LogConfig;
