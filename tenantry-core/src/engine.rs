//! Per-namespace engines.
//!
//! An [`Engine`] is a connection pool whose every physical connection has
//! its `search_path` pinned to one namespace when the connection is opened.
//! The namespace is a construction parameter, never a per-query switch.

use crate::context::SessionContext;
use crate::session::ScopedSession;
use crate::TenancyResult;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tenantry_config::DatabaseSettings;
use tenantry_schema::NamespaceName;
use tracing::{debug, info};

/// A pool bound to one namespace.
pub struct Engine {
    namespace: NamespaceName,
    connection: DatabaseConnection,
    disposed: AtomicBool,
    created_at: Instant,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("namespace", &self.namespace)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Engine {
    /// Wrap an already configured connection.
    pub fn new(namespace: NamespaceName, connection: DatabaseConnection) -> Self {
        Self {
            namespace,
            connection,
            disposed: AtomicBool::new(false),
            created_at: Instant::now(),
        }
    }

    pub fn namespace(&self) -> &NamespaceName {
        &self.namespace
    }

    /// Underlying SeaORM connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Time since the pool was opened.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Begin a transaction on a pooled connection.
    ///
    /// Dropping the returned session without committing rolls back and
    /// returns the connection to the pool.
    pub async fn open_session(&self, context: SessionContext) -> TenancyResult<ScopedSession> {
        let transaction = self.connection.begin().await?;
        debug!(namespace = %self.namespace, kind = %context.kind(), "Session opened");
        Ok(ScopedSession::new(context, self.namespace.clone(), transaction))
    }

    /// Check connectivity.
    pub async fn ping(&self) -> TenancyResult<()> {
        self.connection.ping().await?;
        Ok(())
    }

    /// Close the pool. Idle connections close immediately; checked-out
    /// connections close when their sessions end. Safe to call twice.
    pub async fn dispose(&self) -> TenancyResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(namespace = %self.namespace, age_secs = self.age().as_secs(), "Disposing engine");
        self.connection.close_by_ref().await?;
        Ok(())
    }

    /// Backend the engine talks to.
    pub fn backend(&self) -> sea_orm::DatabaseBackend {
        self.connection.get_database_backend()
    }
}

/// Creates engines for namespaces. Swapped for an in-memory factory in tests.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Open a pool whose connections are pinned to `namespace`.
    async fn create_engine(&self, namespace: &NamespaceName) -> TenancyResult<Engine>;
}

/// Opens PostgreSQL pools through SeaORM.
#[derive(Debug, Clone)]
pub struct SeaOrmEngineFactory {
    settings: DatabaseSettings,
}

impl SeaOrmEngineFactory {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Connect options for `namespace`.
    ///
    /// SeaORM applies the search path in an after-connect hook, so it holds
    /// for every connection the pool ever opens.
    pub fn connect_options(&self, namespace: &NamespaceName) -> ConnectOptions {
        let settings = &self.settings;
        let mut options = ConnectOptions::new(settings.database_url.clone());

        options
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .connect_timeout(settings.connect_timeout)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .sqlx_logging(settings.sqlx_logging)
            .set_schema_search_path(namespace.search_path());

        options
    }
}

#[async_trait]
impl EngineFactory for SeaOrmEngineFactory {
    async fn create_engine(&self, namespace: &NamespaceName) -> TenancyResult<Engine> {
        info!(
            namespace = %namespace,
            url = %self.settings.redacted_url(),
            max_connections = self.settings.max_connections,
            "Opening engine"
        );

        let connection = sea_orm::Database::connect(self.connect_options(namespace)).await?;
        Ok(Engine::new(namespace.clone(), connection))
    }
}
