//! Process lifecycle.
//!
//! [`Tenancy`] owns every shared component and wires them together at
//! startup. Build it once, share it behind an `Arc`, and call
//! [`shutdown`](Tenancy::shutdown) before the process exits.
//!
//! ```rust,ignore
//! let config = TenancyConfig::from_env()?;
//! tenantry_log::init(&config.log)?;
//!
//! let tenancy = Tenancy::bootstrap(config, schema).await?;
//! let session = tenancy.router().resolve_session(&mut ctx).await?;
//! // ...
//! tenancy.shutdown().await?;
//! ```

use crate::directory::{TenantDirectory, TenantRecord, tenants_table, TENANTS_TABLE};
use crate::engine::{EngineFactory, SeaOrmEngineFactory};
use crate::entity::SeaOrmTenantDirectory;
use crate::management::TenantAdmin;
use crate::provisioner::{PostgresSchemaProvider, SchemaProvider, TenantProvisioner};
use crate::registry::ConnectionRegistry;
use crate::router::SessionRouter;
use crate::TenancyResult;
use std::sync::Arc;
use tenantry_config::TenancyConfig;
use tenantry_schema::{SchemaCloner, SchemaDefinition};
use tracing::{info, warn};

/// The wired tenancy runtime.
pub struct Tenancy {
    config: TenancyConfig,
    registry: Arc<ConnectionRegistry>,
    provisioner: Arc<TenantProvisioner>,
    directory: Arc<dyn TenantDirectory>,
    router: SessionRouter,
    admin: TenantAdmin,
}

impl std::fmt::Debug for Tenancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenancy")
            .field("database_url", &self.config.database.redacted_url())
            .field("resolution", &self.config.resolution)
            .finish()
    }
}

impl Tenancy {
    /// Start building a runtime.
    pub fn builder(config: TenancyConfig, schema: SchemaDefinition) -> TenancyBuilder {
        TenancyBuilder::new(config, schema)
    }

    /// Connect to PostgreSQL and wire everything with the default components.
    pub async fn bootstrap(config: TenancyConfig, schema: SchemaDefinition) -> TenancyResult<Self> {
        Self::builder(config, schema).build().await
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn provisioner(&self) -> &Arc<TenantProvisioner> {
        &self.provisioner
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.directory
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    pub fn admin(&self) -> &TenantAdmin {
        &self.admin
    }

    /// Release every engine, the global one included.
    pub async fn shutdown(&self) -> TenancyResult<()> {
        info!("Shutting down tenancy runtime");
        self.registry.shutdown().await
    }
}

/// Builder for [`Tenancy`]. Any component left unset gets its PostgreSQL
/// default.
pub struct TenancyBuilder {
    config: TenancyConfig,
    schema: SchemaDefinition,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    schema_provider: Option<Arc<dyn SchemaProvider>>,
    directory: Option<Arc<dyn TenantDirectory>>,
}

impl TenancyBuilder {
    pub fn new(config: TenancyConfig, schema: SchemaDefinition) -> Self {
        Self {
            config,
            schema,
            engine_factory: None,
            schema_provider: None,
            directory: None,
        }
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.schema_provider = Some(provider);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Connect, prepare the global namespace and wire the components.
    pub async fn build(self) -> TenancyResult<Tenancy> {
        let TenancyBuilder {
            config,
            mut schema,
            engine_factory,
            schema_provider,
            directory,
        } = self;

        config.validate()?;

        if !schema.contains(TENANTS_TABLE) {
            schema.add_table(tenants_table())?;
        }

        let factory = engine_factory
            .unwrap_or_else(|| Arc::new(SeaOrmEngineFactory::new(config.database.clone())));
        let registry = Arc::new(ConnectionRegistry::init(factory).await?);

        // Nothing may survive from an earlier run in this process.
        registry.clear_all().await?;

        let global = registry.global_engine();
        let provider = schema_provider.unwrap_or_else(|| Arc::new(PostgresSchemaProvider::new(global.clone())));
        let directory = directory.unwrap_or_else(|| Arc::new(SeaOrmTenantDirectory::new(global)));

        let provisioner = Arc::new(TenantProvisioner::new(provider, SchemaCloner::new(schema)));
        provisioner.ensure_global_tables().await?;

        let router = SessionRouter::new(
            directory.clone(),
            provisioner.clone(),
            registry.clone(),
            config.resolution.clone(),
        );
        let admin = TenantAdmin::new(
            directory.clone(),
            provisioner.clone(),
            registry.clone(),
            config.resolution.clone(),
            config.tenants.billing_tier.clone(),
        );

        let tenancy = Tenancy {
            config,
            registry,
            provisioner,
            directory,
            router,
            admin,
        };
        tenancy.seed_default_tenant().await?;

        info!("Tenancy runtime ready");
        Ok(tenancy)
    }
}

impl Tenancy {
    /// Create the configured default tenant unless it already exists.
    async fn seed_default_tenant(&self) -> TenancyResult<Option<TenantRecord>> {
        let seed = &self.config.default_tenant;
        if !seed.enabled {
            return Ok(None);
        }

        if let Some(existing) = self.directory.find_by_namespace(&seed.namespace_name).await? {
            info!(namespace = %existing.namespace_name, "Default tenant already exists");
            return Ok(Some(existing));
        }
        if self
            .directory
            .find_by_public_identifier(&seed.public_identifier)
            .await?
            .is_some()
        {
            warn!(
                identifier = %seed.public_identifier,
                "Default tenant identifier taken by another tenant, skipping seed"
            );
            return Ok(None);
        }

        let mut request =
            crate::management::CreateTenantRequest::new(&seed.namespace_name, &seed.public_identifier);
        if let Some(tier) = &seed.billing_tier {
            request = request.with_billing_tier(tier);
        }

        let record = self.admin.create_tenant(request).await?;
        info!(tenant_id = %record.id, namespace = %record.namespace_name, "Default tenant seeded");
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::directory::InMemoryTenantDirectory;
    use crate::testing::{InMemorySchemaProvider, MockEngineFactory};
    use tenantry_config::DatabaseSettings;
    use tenantry_schema::{ColumnDefinition, ColumnType, NamespaceName, TableDefinition};

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new()
            .with_table(
                TableDefinition::tenant("students")
                    .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                    .with_primary_key(["id"]),
            )
            .unwrap()
    }

    fn config() -> TenancyConfig {
        TenancyConfig {
            database: DatabaseSettings::new("postgres://localhost/school"),
            ..TenancyConfig::default()
        }
    }

    async fn build(config: TenancyConfig) -> (Tenancy, Arc<InMemorySchemaProvider>) {
        let provider = Arc::new(InMemorySchemaProvider::new());
        let tenancy = Tenancy::builder(config, schema())
            .engine_factory(Arc::new(MockEngineFactory::new()))
            .schema_provider(provider.clone())
            .directory(Arc::new(InMemoryTenantDirectory::new()))
            .build()
            .await
            .unwrap();
        (tenancy, provider)
    }

    #[tokio::test]
    async fn test_bootstrap_creates_global_tables() {
        let (tenancy, provider) = build(config()).await;

        assert_eq!(provider.tables_in(&NamespaceName::global()), ["tenants"]);
        assert!(tenancy.registry().is_empty());
        assert_eq!(tenancy.directory().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_default_tenant() {
        let mut config = config();
        config.default_tenant.enabled = true;

        let (tenancy, provider) = build(config).await;

        let seeded = tenancy
            .directory()
            .find_by_public_identifier("school-alpha")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seeded.namespace_name, "school_alpha");
        assert_eq!(seeded.billing_tier, "basic");
        assert_eq!(provider.tables_in(&seeded.namespace().unwrap()), ["students"]);

        // Seeding again is a no-op
        assert_eq!(tenancy.seed_default_tenant().await.unwrap(), Some(seeded));
        assert_eq!(tenancy.directory().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.database.max_connections = 0;

        let result = Tenancy::builder(config, schema())
            .engine_factory(Arc::new(MockEngineFactory::new()))
            .schema_provider(Arc::new(InMemorySchemaProvider::new()))
            .directory(Arc::new(InMemoryTenantDirectory::new()))
            .build()
            .await;

        assert!(matches!(result, Err(crate::TenancyError::Config(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_and_shutdown() {
        let mut config = config();
        config.default_tenant.enabled = true;
        let (tenancy, _) = build(config).await;

        let mut ctx = RequestContext::new().with_host("school-alpha.example.edu");
        let session = tenancy.router().resolve_session(&mut ctx).await.unwrap();
        assert_eq!(session.namespace().as_str(), "school_alpha");
        session.commit().await.unwrap();

        let engine = tenancy
            .registry()
            .get_or_create_engine(&NamespaceName::new("school_alpha").unwrap())
            .await
            .unwrap();

        tenancy.shutdown().await.unwrap();
        assert!(engine.is_disposed());
        assert!(tenancy.registry().global_engine().is_disposed());
    }
}
