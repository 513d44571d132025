//! Schema-per-tenant routing for PostgreSQL
//!
//! Every tenant's data lives in its own PostgreSQL namespace with an
//! identical table layout. Shared data (the tenant directory itself, and
//! anything else declared global) lives in `public`. This crate decides,
//! per request, which namespace a database session is bound to.
//!
//! ## Features
//!
//! - **Resolution**: `X-Tenant-ID` header or `Host` subdomain, with a
//!   reserved marker for the global namespace
//! - **Provisioning**: namespaces and tables are created on first use,
//!   idempotently and without blocking other tenants
//! - **Engine cache**: one connection pool per namespace, with the
//!   `search_path` pinned when each connection is opened
//! - **Scoped sessions**: every session is a transaction that rolls back
//!   unless the handler commits
//! - **Administration**: create, deactivate, reactivate and rename tenants
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tenantry_core::prelude::*;
//!
//! let tenancy = Tenancy::bootstrap(TenancyConfig::from_env()?, schema).await?;
//!
//! let mut ctx = RequestContext::new().with_tenant_header("acme-corp");
//! let session = tenancy.router().resolve_session(&mut ctx).await?;
//!
//! // All queries run inside the `acme` namespace
//! let students = student::Entity::find().all(&*session).await?;
//! session.commit().await?;
//! ```

#![warn(clippy::all)]

pub mod context;
pub mod directory;
pub mod engine;
pub mod entity;
pub mod error;
pub mod management;
pub mod provisioner;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::{
    ContextKind, RequestContext, SessionContext, TenantContextState, extract_subdomain,
    require_global_context, require_tenant_context,
};
pub use directory::{
    InMemoryTenantDirectory, Page, TENANTS_TABLE, TenantDirectory, TenantFilter, TenantRecord,
    tenants_table,
};
pub use engine::{Engine, EngineFactory, SeaOrmEngineFactory};
pub use entity::SeaOrmTenantDirectory;
pub use error::{ErrorBody, TenancyError, TenancyResult};
pub use management::{CreateTenantRequest, TenantAdmin};
pub use provisioner::{PostgresSchemaProvider, SchemaProvider, TenantProvisioner};
pub use registry::ConnectionRegistry;
pub use router::SessionRouter;
pub use runtime::{Tenancy, TenancyBuilder};
pub use session::ScopedSession;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::context::{RequestContext, SessionContext, require_global_context, require_tenant_context};
    pub use crate::directory::{TenantDirectory, TenantFilter, TenantRecord};
    pub use crate::error::{TenancyError, TenancyResult};
    pub use crate::management::{CreateTenantRequest, TenantAdmin};
    pub use crate::router::SessionRouter;
    pub use crate::runtime::Tenancy;
    pub use crate::session::ScopedSession;
    pub use tenantry_config::TenancyConfig;
    pub use tenantry_schema::prelude::*;
}
