//! In-memory stand-ins for the database seams.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream test suites.

use crate::engine::{Engine, EngineFactory};
use crate::provisioner::SchemaProvider;
use crate::{TenancyError, TenancyResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::{DatabaseBackend, MockDatabase};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tenantry_schema::{BoundTable, DeferredForeignKey, NamespaceName};

/// Engine over a SeaORM mock connection. Transactions begin, commit and
/// roll back; queries fail unless results were queued.
pub fn mock_engine(namespace: NamespaceName) -> Engine {
    Engine::new(namespace, MockDatabase::new(DatabaseBackend::Postgres).into_connection())
}

/// Engine factory that counts creations per namespace.
#[derive(Default)]
pub struct MockEngineFactory {
    created: Mutex<HashMap<NamespaceName, usize>>,
    delay: Option<Duration>,
    fail_next: AtomicBool,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before each creation, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next creation fail with a connection timeout.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Successful creations for `namespace`.
    pub fn created_for(&self, namespace: &NamespaceName) -> usize {
        self.created.lock().get(namespace).copied().unwrap_or(0)
    }

    /// Successful creations across all namespaces.
    pub fn total_created(&self) -> usize {
        self.created.lock().values().sum()
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn create_engine(&self, namespace: &NamespaceName) -> TenancyResult<Engine> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TenancyError::ConnectionTimeout);
        }

        *self.created.lock().entry(namespace.clone()).or_insert(0) += 1;
        Ok(mock_engine(namespace.clone()))
    }
}

/// Schema provider that emulates `IF NOT EXISTS` DDL in memory.
///
/// Counts the objects it actually creates, so tests can assert that
/// repeated or concurrent provisioning produced exactly one of each.
#[derive(Default)]
pub struct InMemorySchemaProvider {
    namespaces: Mutex<HashSet<NamespaceName>>,
    tables: Mutex<HashMap<NamespaceName, HashSet<String>>>,
    foreign_keys: Mutex<HashMap<NamespaceName, HashSet<String>>>,
    namespace_creations: AtomicUsize,
    table_creations: AtomicUsize,
    check_calls: AtomicUsize,
    fail_on_table: Mutex<Option<String>>,
    fail_namespace: AtomicBool,
    delay: Option<Duration>,
}

impl InMemorySchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the scheduler for `delay` inside every DDL call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every creation of the named table until cleared.
    pub fn fail_on_table(&self, table: Option<&str>) {
        *self.fail_on_table.lock() = table.map(str::to_string);
    }

    /// Fail every namespace creation.
    pub fn fail_namespace_creation(&self, fail: bool) {
        self.fail_namespace.store(fail, Ordering::SeqCst);
    }

    pub fn has_namespace(&self, namespace: &NamespaceName) -> bool {
        self.namespaces.lock().contains(namespace)
    }

    /// Tables present in `namespace`, sorted.
    pub fn tables_in(&self, namespace: &NamespaceName) -> Vec<String> {
        let mut tables: Vec<_> = self
            .tables
            .lock()
            .get(namespace)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        tables.sort();
        tables
    }

    /// Foreign key constraints present in `namespace`, sorted.
    pub fn foreign_keys_in(&self, namespace: &NamespaceName) -> Vec<String> {
        let mut keys: Vec<_> = self
            .foreign_keys
            .lock()
            .get(namespace)
            .map(|k| k.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn has_table(&self, namespace: &NamespaceName, table: &str) -> bool {
        self.tables
            .lock()
            .get(namespace)
            .is_some_and(|tables| tables.contains(table))
    }

    /// Namespaces actually created (not counting no-op repeats).
    pub fn namespace_creations(&self) -> usize {
        self.namespace_creations.load(Ordering::SeqCst)
    }

    /// Tables actually created (not counting no-op repeats).
    pub fn table_creations(&self) -> usize {
        self.table_creations.load(Ordering::SeqCst)
    }

    /// Existence checks performed.
    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SchemaProvider for InMemorySchemaProvider {
    async fn namespace_exists(&self, namespace: &NamespaceName) -> TenancyResult<bool> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(namespace.is_global() || self.has_namespace(namespace))
    }

    async fn existing_tables(&self, namespace: &NamespaceName) -> TenancyResult<HashSet<String>> {
        self.pause().await;
        Ok(self.tables.lock().get(namespace).cloned().unwrap_or_default())
    }

    async fn existing_foreign_keys(&self, namespace: &NamespaceName) -> TenancyResult<HashSet<String>> {
        self.pause().await;
        Ok(self.foreign_keys.lock().get(namespace).cloned().unwrap_or_default())
    }

    async fn create_namespace(&self, namespace: &NamespaceName) -> TenancyResult<()> {
        self.pause().await;
        if self.fail_namespace.load(Ordering::SeqCst) {
            return Err(TenancyError::Database(sea_orm::DbErr::Custom(format!(
                "permission denied to create schema {}",
                namespace
            ))));
        }

        if self.namespaces.lock().insert(namespace.clone()) {
            self.namespace_creations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn create_table(&self, table: &BoundTable, deferred: &[&str]) -> TenancyResult<()> {
        self.pause().await;
        if self.fail_on_table.lock().as_deref() == Some(table.name()) {
            return Err(TenancyError::Database(sea_orm::DbErr::Custom(format!(
                "could not create table {}",
                table.qualified()
            ))));
        }

        let namespace = table.namespace();
        if !namespace.is_global() && !self.has_namespace(namespace) {
            return Err(TenancyError::Database(sea_orm::DbErr::Custom(format!(
                "schema \"{}\" does not exist",
                namespace
            ))));
        }

        let inserted = self
            .tables
            .lock()
            .entry(namespace.clone())
            .or_default()
            .insert(table.name().to_string());
        if inserted {
            self.table_creations.fetch_add(1, Ordering::SeqCst);
            let mut foreign_keys = self.foreign_keys.lock();
            let keys = foreign_keys.entry(namespace.clone()).or_default();
            for fk in table.foreign_keys() {
                if !deferred.contains(&fk.name.as_str()) {
                    keys.insert(fk.name.clone());
                }
            }
        }
        Ok(())
    }

    async fn add_foreign_key(&self, key: &DeferredForeignKey<'_>) -> TenancyResult<()> {
        self.pause().await;
        let target = &key.foreign_key.target;
        if !self.has_table(key.table.namespace(), key.table.name())
            || !self.has_table(&target.namespace, &target.name)
        {
            return Err(TenancyError::Database(sea_orm::DbErr::Custom(format!(
                "relation \"{}\" does not exist",
                target
            ))));
        }

        self.foreign_keys
            .lock()
            .entry(key.table.namespace().clone())
            .or_default()
            .insert(key.name().to_string());
        Ok(())
    }
}
