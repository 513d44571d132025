//! Connection registry.
//!
//! Process-wide cache of one [`Engine`] per namespace. The registry is an
//! ordinary value: build it at startup with [`ConnectionRegistry::init`],
//! share it behind an `Arc`, and call [`clear_all`](ConnectionRegistry::clear_all)
//! or [`shutdown`](ConnectionRegistry::shutdown) to release pools.
//!
//! # Usage
//!
//! ```rust,ignore
//! let factory = Arc::new(SeaOrmEngineFactory::new(config.database.clone()));
//! let registry = ConnectionRegistry::init(factory).await?;
//!
//! let engine = registry.get_or_create_engine(&NamespaceName::new("acme")?).await?;
//! let session = engine.open_session(context).await?;
//! ```

use crate::engine::{Engine, EngineFactory};
use crate::TenancyResult;
use std::collections::HashMap;
use std::sync::Arc;
use tenantry_schema::NamespaceName;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type EngineSlot = Arc<OnceCell<Arc<Engine>>>;

/// Cache of per-namespace engines.
///
/// The map lock is never held across an await. Concurrent first requests
/// for the same namespace share one slot, so
/// exactly one of them runs the factory and the rest await its result.
/// A failed creation leaves the slot empty for the next caller to retry.
pub struct ConnectionRegistry {
    factory: Arc<dyn EngineFactory>,
    global: Arc<Engine>,
    engines: RwLock<HashMap<NamespaceName, EngineSlot>>,
}

impl ConnectionRegistry {
    /// Create the registry and open the global engine.
    pub async fn init(factory: Arc<dyn EngineFactory>) -> TenancyResult<Self> {
        let global = Arc::new(factory.create_engine(&NamespaceName::global()).await?);
        info!("Connection registry initialized");

        Ok(Self {
            factory,
            global,
            engines: RwLock::new(HashMap::new()),
        })
    }

    /// The shared engine bound to `public`.
    pub fn global_engine(&self) -> Arc<Engine> {
        Arc::clone(&self.global)
    }

    /// Return the cached engine for `namespace`, creating it on first use.
    pub async fn get_or_create_engine(&self, namespace: &NamespaceName) -> TenancyResult<Arc<Engine>> {
        if namespace.is_global() {
            return Ok(self.global_engine());
        }

        loop {
            let slot = self.slot(namespace);

            let engine = slot
                .get_or_try_init(|| async {
                    let engine = self.factory.create_engine(namespace).await?;
                    info!(namespace = %namespace, "Engine created");
                    Ok::<_, crate::TenancyError>(Arc::new(engine))
                })
                .await?;

            // An eviction that raced the creation leaves this slot orphaned.
            if self.is_current(namespace, &slot) {
                return Ok(Arc::clone(engine));
            }

            warn!(namespace = %namespace, "Engine evicted during creation, retrying");
            engine.dispose().await?;
        }
    }

    fn slot(&self, namespace: &NamespaceName) -> EngineSlot {
        if let Some(slot) = self.engines.read().get(namespace) {
            return Arc::clone(slot);
        }

        let mut engines = self.engines.write();
        Arc::clone(engines.entry(namespace.clone()).or_default())
    }

    fn is_current(&self, namespace: &NamespaceName, slot: &EngineSlot) -> bool {
        let engines = self.engines.read();
        engines.get(namespace).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Remove and dispose the engine for `namespace`. The next request
    /// creates a fresh one. Returns whether an engine was cached.
    pub async fn evict(&self, namespace: &NamespaceName) -> TenancyResult<bool> {
        let slot = self.engines.write().remove(namespace);

        match slot.as_ref().and_then(|slot| slot.get()) {
            Some(engine) => {
                engine.dispose().await?;
                info!(namespace = %namespace, "Engine evicted");
                Ok(true)
            }
            None => {
                debug!(namespace = %namespace, "No cached engine to evict");
                Ok(false)
            }
        }
    }

    /// Dispose and remove every tenant engine. The global engine stays open.
    ///
    /// Every engine is disposed even if one fails; the first error is
    /// returned. Returns how many engines were released.
    pub async fn clear_all(&self) -> TenancyResult<usize> {
        let slots: Vec<(NamespaceName, EngineSlot)> = self.engines.write().drain().collect();

        let mut released = 0;
        let mut first_error = None;

        for (namespace, slot) in slots {
            let Some(engine) = slot.get() else { continue };
            match engine.dispose().await {
                Ok(()) => released += 1,
                Err(err) => {
                    warn!(namespace = %namespace, error = %err, "Failed to dispose engine");
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(released, "Engine cache cleared");

        match first_error {
            Some(err) => Err(err),
            None => Ok(released),
        }
    }

    /// Release every tenant engine and the global engine.
    pub async fn shutdown(&self) -> TenancyResult<()> {
        let cleared = self.clear_all().await;
        self.global.dispose().await?;
        info!("Connection registry shut down");
        cleared.map(|_| ())
    }

    /// Whether a live engine is cached for `namespace`.
    pub fn contains(&self, namespace: &NamespaceName) -> bool {
        let engines = self.engines.read();
        engines.get(namespace).is_some_and(|slot| slot.initialized())
    }

    /// Number of cached tenant engines.
    pub fn len(&self) -> usize {
        let engines = self.engines.read();
        engines.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Namespaces with a cached engine, sorted.
    pub fn namespaces(&self) -> Vec<NamespaceName> {
        let engines = self.engines.read();
        let mut names: Vec<_> = engines
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
