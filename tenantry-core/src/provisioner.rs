//! Tenant provisioning.
//!
//! Makes sure a tenant's namespace and tables exist before the first
//! session is handed out. Every step checks before it creates, and every
//! creation is `IF NOT EXISTS`, so provisioning is idempotent, safe to race
//! and safe to re-run after a partial failure.
//!
//! # Usage
//!
//! ```rust,ignore
//! let provider = Arc::new(PostgresSchemaProvider::new(registry.global_engine()));
//! let provisioner = TenantProvisioner::new(provider, SchemaCloner::new(schema));
//!
//! provisioner.ensure_global_tables().await?;
//! provisioner.ensure_provisioned("acme").await?;
//! ```

use crate::engine::Engine;
use crate::{TenancyError, TenancyResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, SqlErr, Statement};
use std::collections::HashSet;
use std::sync::Arc;
use tenantry_schema::{
    BoundTable, CreationPlan, DeferredForeignKey, NamespaceName, SchemaCloner, create_namespace_sql,
    creation_plan,
};
use tracing::{debug, info, warn};

/// Catalog access and DDL execution for one database.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Check if the namespace exists.
    async fn namespace_exists(&self, namespace: &NamespaceName) -> TenancyResult<bool>;

    /// Names of the tables present in the namespace.
    async fn existing_tables(&self, namespace: &NamespaceName) -> TenancyResult<HashSet<String>>;

    /// Create the namespace if it does not exist.
    async fn create_namespace(&self, namespace: &NamespaceName) -> TenancyResult<()>;

    /// Names of the foreign key constraints present in the namespace.
    async fn existing_foreign_keys(&self, namespace: &NamespaceName) -> TenancyResult<HashSet<String>>;

    /// Create the table (and its indexes) if it does not exist, leaving out
    /// the `deferred` foreign keys.
    async fn create_table(&self, table: &BoundTable, deferred: &[&str]) -> TenancyResult<()>;

    /// Add a foreign key that was deferred at table creation. Adding a key
    /// that already exists succeeds.
    async fn add_foreign_key(&self, key: &DeferredForeignKey<'_>) -> TenancyResult<()>;
}

/// [`SchemaProvider`] for PostgreSQL, running on the global engine.
pub struct PostgresSchemaProvider {
    engine: Arc<Engine>,
}

impl PostgresSchemaProvider {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Two sessions running `CREATE ... IF NOT EXISTS` at the same moment
    /// can still collide on the catalog's unique index. The loser sees a
    /// unique violation for an object that now exists, which is success.
    fn lost_creation_race(err: &DbErr) -> bool {
        matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    }
}

#[async_trait]
impl SchemaProvider for PostgresSchemaProvider {
    async fn namespace_exists(&self, namespace: &NamespaceName) -> TenancyResult<bool> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            r#"SELECT EXISTS(SELECT 1 FROM information_schema.schemata WHERE schema_name = $1) AS "exists""#,
            [namespace.as_str().into()],
        );

        match self.engine.connection().query_one(stmt).await? {
            Some(row) => Ok(row.try_get::<bool>("", "exists")?),
            None => Ok(false),
        }
    }

    async fn existing_tables(&self, namespace: &NamespaceName) -> TenancyResult<HashSet<String>> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT table_name FROM information_schema.tables WHERE table_schema = $1",
            [namespace.as_str().into()],
        );

        let rows = self.engine.connection().query_all(stmt).await?;
        rows.iter()
            .map(|row| row.try_get::<String>("", "table_name").map_err(TenancyError::from))
            .collect()
    }

    async fn create_namespace(&self, namespace: &NamespaceName) -> TenancyResult<()> {
        let sql = create_namespace_sql(namespace);
        match self.engine.connection().execute_unprepared(&sql).await {
            Ok(_) => Ok(()),
            Err(err) if Self::lost_creation_race(&err) && self.namespace_exists(namespace).await? => {
                debug!(namespace = %namespace, "Namespace created concurrently");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn existing_foreign_keys(&self, namespace: &NamespaceName) -> TenancyResult<HashSet<String>> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT constraint_name FROM information_schema.table_constraints \
             WHERE constraint_schema = $1 AND constraint_type = 'FOREIGN KEY'",
            [namespace.as_str().into()],
        );

        let rows = self.engine.connection().query_all(stmt).await?;
        rows.iter()
            .map(|row| row.try_get::<String>("", "constraint_name").map_err(TenancyError::from))
            .collect()
    }

    async fn create_table(&self, table: &BoundTable, deferred: &[&str]) -> TenancyResult<()> {
        let conn = self.engine.connection();

        match conn.execute_unprepared(&table.create_sql_without(deferred)).await {
            Ok(_) => {}
            Err(err)
                if Self::lost_creation_race(&err)
                    && self.existing_tables(table.namespace()).await?.contains(table.name()) =>
            {
                debug!(table = %table.qualified(), "Table created concurrently");
            }
            Err(err) => return Err(err.into()),
        }

        for sql in table.index_sql() {
            match conn.execute_unprepared(&sql).await {
                Ok(_) => {}
                Err(err) if Self::lost_creation_race(&err) => {
                    debug!(table = %table.qualified(), "Index created concurrently");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    async fn add_foreign_key(&self, key: &DeferredForeignKey<'_>) -> TenancyResult<()> {
        let namespace = key.table.namespace();
        if self.existing_foreign_keys(namespace).await?.contains(key.name()) {
            return Ok(());
        }

        match self.engine.connection().execute_unprepared(&key.add_sql()).await {
            Ok(_) => Ok(()),
            // A concurrent add raises duplicate_object, which has no SqlErr variant.
            Err(err) if self.existing_foreign_keys(namespace).await?.contains(key.name()) => {
                debug!(constraint = key.name(), error = %err, "Foreign key added concurrently");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// First-use setup for tenant namespaces.
pub struct TenantProvisioner {
    provider: Arc<dyn SchemaProvider>,
    cloner: SchemaCloner,
    provisioned: RwLock<HashSet<NamespaceName>>,
}

impl TenantProvisioner {
    pub fn new(provider: Arc<dyn SchemaProvider>, cloner: SchemaCloner) -> Self {
        Self {
            provider,
            cloner,
            provisioned: RwLock::new(HashSet::new()),
        }
    }

    pub fn cloner(&self) -> &SchemaCloner {
        &self.cloner
    }

    /// Make sure `namespace_name` and all of its tables exist.
    ///
    /// Returns immediately when this process already provisioned the
    /// namespace. Otherwise checks the catalog, creates the namespace if
    /// missing and creates only the tables that are missing. A schema
    /// integrity problem is reported before any DDL runs.
    pub async fn ensure_provisioned(&self, namespace_name: &str) -> TenancyResult<()> {
        let namespace = NamespaceName::new(namespace_name).map_err(|err| TenancyError::Provisioning {
            namespace: namespace_name.to_string(),
            reason: err.to_string(),
        })?;

        if self.is_provisioned(&namespace) {
            return Ok(());
        }

        let cloned = self.cloner.clone_into(&namespace)?;
        let plan = cloned.creation_plan();

        let exists = self
            .provider
            .namespace_exists(&namespace)
            .await
            .map_err(|e| TenancyError::provisioning(&namespace, e))?;

        let (existing, existing_keys) = if exists {
            self.catalog(&namespace, &plan).await?
        } else {
            (HashSet::new(), HashSet::new())
        };

        let missing: Vec<&BoundTable> = plan
            .tables
            .iter()
            .copied()
            .filter(|table| !existing.contains(table.name()))
            .collect();
        let missing_keys: Vec<&DeferredForeignKey<'_>> = plan
            .deferred
            .iter()
            .filter(|key| !existing_keys.contains(key.name()))
            .collect();

        if exists && missing.is_empty() && missing_keys.is_empty() {
            debug!(namespace = %namespace, "Namespace already provisioned");
            self.provisioned.write().insert(namespace);
            return Ok(());
        }

        info!(
            namespace = %namespace,
            create_namespace = !exists,
            missing_tables = missing.len(),
            missing_foreign_keys = missing_keys.len(),
            "Provisioning tenant namespace"
        );

        if !exists {
            self.provider
                .create_namespace(&namespace)
                .await
                .map_err(|e| fail(&namespace, e))?;
        }

        self.create_missing(&namespace, &plan, &missing, &missing_keys).await?;

        info!(namespace = %namespace, "Tenant namespace provisioned");
        self.provisioned.write().insert(namespace);
        Ok(())
    }

    /// Create any missing global tables in `public`.
    pub async fn ensure_global_tables(&self) -> TenancyResult<()> {
        let global = NamespaceName::global();
        let tables = self.cloner.bind_global()?;
        let plan = creation_plan(&tables);

        let (existing, existing_keys) = self.catalog(&global, &plan).await?;
        let missing: Vec<&BoundTable> = plan
            .tables
            .iter()
            .copied()
            .filter(|t| !existing.contains(t.name()))
            .collect();
        let missing_keys: Vec<&DeferredForeignKey<'_>> = plan
            .deferred
            .iter()
            .filter(|key| !existing_keys.contains(key.name()))
            .collect();

        self.create_missing(&global, &plan, &missing, &missing_keys).await?;

        info!(created = missing.len(), "Global tables ready");
        Ok(())
    }

    /// Tables present in `namespace`, and its foreign keys when the plan
    /// defers any.
    async fn catalog(
        &self,
        namespace: &NamespaceName,
        plan: &CreationPlan<'_>,
    ) -> TenancyResult<(HashSet<String>, HashSet<String>)> {
        let tables = self
            .provider
            .existing_tables(namespace)
            .await
            .map_err(|e| TenancyError::provisioning(namespace, e))?;

        let keys = if plan.deferred.is_empty() {
            HashSet::new()
        } else {
            self.provider
                .existing_foreign_keys(namespace)
                .await
                .map_err(|e| TenancyError::provisioning(namespace, e))?
        };

        Ok((tables, keys))
    }

    async fn create_missing(
        &self,
        namespace: &NamespaceName,
        plan: &CreationPlan<'_>,
        tables: &[&BoundTable],
        keys: &[&DeferredForeignKey<'_>],
    ) -> TenancyResult<()> {
        for table in tables {
            self.provider
                .create_table(table, &plan.deferred_for(table))
                .await
                .map_err(|e| fail(namespace, e))?;
        }

        for key in keys {
            self.provider
                .add_foreign_key(key)
                .await
                .map_err(|e| fail(namespace, e))?;
        }

        Ok(())
    }

    /// Whether this process has already provisioned `namespace`.
    pub fn is_provisioned(&self, namespace: &NamespaceName) -> bool {
        self.provisioned.read().contains(namespace)
    }

    /// Drop the memo for `namespace` so the next call re-checks the catalog.
    pub fn forget(&self, namespace: &NamespaceName) {
        self.provisioned.write().remove(namespace);
    }
}

fn fail(namespace: &NamespaceName, err: TenancyError) -> TenancyError {
    let err = TenancyError::provisioning(namespace, err);
    warn!(namespace = %namespace, error = %err, "Provisioning step failed");
    err
}
