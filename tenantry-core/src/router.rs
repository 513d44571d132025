//! Session routing.
//!
//! Turns an inbound request into a [`ScopedSession`] bound to the right
//! namespace. Resolution runs in a fixed order:
//!
//! 1. Take the identifier from the tenant header, or the `Host` subdomain.
//! 2. The global marker selects the `public` namespace.
//! 3. Look the tenant up; unknown and inactive tenants stop here.
//! 4. Provision the namespace on first use.
//! 5. Fetch the cached engine and open a session on it.
//! 6. Re-read the tenant. A deactivation that landed while the request was
//!    provisioning wins: the fresh engine is evicted and the session dropped.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut ctx = RequestContext::from_headers(headers, router.settings());
//! let session = router.resolve_session(&mut ctx).await?;
//!
//! let students = student::Entity::find().all(&*session).await?;
//! session.commit().await?;
//! ```

use crate::context::{RequestContext, SessionContext, TenantContextState};
use crate::directory::{TenantDirectory, TenantRecord};
use crate::provisioner::TenantProvisioner;
use crate::registry::ConnectionRegistry;
use crate::session::ScopedSession;
use crate::{TenancyError, TenancyResult};
use std::future::Future;
use std::sync::Arc;
use tenantry_config::ResolutionSettings;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resolves requests to scoped sessions.
pub struct SessionRouter {
    directory: Arc<dyn TenantDirectory>,
    provisioner: Arc<TenantProvisioner>,
    registry: Arc<ConnectionRegistry>,
    settings: ResolutionSettings,
}

impl SessionRouter {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        provisioner: Arc<TenantProvisioner>,
        registry: Arc<ConnectionRegistry>,
        settings: ResolutionSettings,
    ) -> Self {
        Self {
            directory,
            provisioner,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolutionSettings {
        &self.settings
    }

    /// Resolve the request to a session.
    ///
    /// On failure the context moves to `Rejected` and records the error
    /// kind. A context can only be resolved once.
    ///
    /// Dropping the future part way leaves the context in whatever state it
    /// had reached, `Unresolved` or `TenantPending`, and hands out no
    /// session. Anything already provisioned or cached stays valid.
    pub async fn resolve_session(&self, ctx: &mut RequestContext) -> TenancyResult<ScopedSession> {
        if !matches!(ctx.state(), TenantContextState::Unresolved) {
            return Err(TenancyError::AlreadyResolved);
        }

        match self.resolve(ctx).await {
            Ok(session) => Ok(session),
            Err(err) => {
                if err.is_server_error() {
                    warn!(error = %err, code = err.code(), "Tenant resolution failed");
                } else {
                    debug!(error = %err, code = err.code(), "Tenant resolution rejected");
                }
                ctx.reject(&err);
                Err(err)
            }
        }
    }

    async fn resolve(&self, ctx: &mut RequestContext) -> TenancyResult<ScopedSession> {
        let identifier = ctx
            .identifier(&self.settings)
            .ok_or(TenancyError::TenantNotSpecified)?;

        if identifier == self.settings.global_marker {
            let session = self
                .registry
                .global_engine()
                .open_session(SessionContext::Global)
                .await?;
            ctx.advance(TenantContextState::Global);
            debug!("Resolved global session");
            return Ok(session);
        }

        let tenant = self.lookup(&identifier).await?;
        if !tenant.is_active {
            return Err(TenancyError::TenantInactive(identifier));
        }

        let namespace = tenant.namespace()?;
        ctx.advance(TenantContextState::TenantPending {
            tenant_id: tenant.id,
            namespace: namespace.clone(),
        });

        self.provisioner.ensure_provisioned(namespace.as_str()).await?;
        let engine = self.registry.get_or_create_engine(&namespace).await?;
        let session = engine
            .open_session(SessionContext::Tenant {
                tenant_id: tenant.id,
                namespace: namespace.clone(),
            })
            .await?;

        if !self.still_active(tenant.id).await? {
            drop(session);
            self.registry.evict(&namespace).await?;
            self.provisioner.forget(&namespace);
            info!(namespace = %namespace, "Tenant deactivated during resolution");
            return Err(TenancyError::TenantInactive(identifier));
        }

        ctx.advance(TenantContextState::TenantReady {
            tenant_id: tenant.id,
            namespace: namespace.clone(),
        });
        debug!(
            identifier = %identifier,
            tenant_id = %tenant.id,
            namespace = %namespace,
            "Resolved tenant session"
        );
        Ok(session)
    }

    /// Public identifier first; a UUID is accepted for internal callers.
    async fn lookup(&self, identifier: &str) -> TenancyResult<TenantRecord> {
        if let Some(tenant) = self.directory.find_by_public_identifier(identifier).await? {
            return Ok(tenant);
        }

        if let Ok(id) = Uuid::parse_str(identifier) {
            if let Some(tenant) = self.directory.find_by_id(id).await? {
                return Ok(tenant);
            }
        }

        Err(TenancyError::TenantNotFound(identifier.to_string()))
    }

    async fn still_active(&self, id: Uuid) -> TenancyResult<bool> {
        Ok(self
            .directory
            .find_by_id(id)
            .await?
            .is_some_and(|tenant| tenant.is_active))
    }

    /// Resolve the request and hand the session to `handler`.
    ///
    /// The handler owns the session and decides whether to commit. If it
    /// returns without committing, or its future is dropped, the session
    /// rolls back.
    pub async fn run<F, Fut, T>(&self, ctx: &mut RequestContext, handler: F) -> TenancyResult<T>
    where
        F: FnOnce(ScopedSession) -> Fut,
        Fut: Future<Output = TenancyResult<T>>,
    {
        let session = self.resolve_session(ctx).await?;
        let namespace = session.namespace().clone();

        match handler(session).await {
            Ok(value) => {
                debug!(namespace = %namespace, "Request completed");
                Ok(value)
            }
            Err(err) => {
                info!(namespace = %namespace, error = %err, "Request handler failed");
                Err(err)
            }
        }
    }
}
