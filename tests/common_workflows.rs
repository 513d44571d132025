//! Integration tests for common Tenantry workflows.
//!
//! These tests drive the public API end to end on in-memory components.

use std::sync::Arc;
use tenantry::prelude::*;
use tenantry::testing::{InMemorySchemaProvider, MockEngineFactory};
use tenantry::{ConnectionRegistry, InMemoryTenantDirectory, TenantContextState};

fn school_schema() -> SchemaDefinition {
    SchemaDefinition::new()
        .with_table(
            TableDefinition::global("billing_plans")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("name", ColumnType::String(64)).unique())
                .with_primary_key(["id"]),
        )
        .unwrap()
        .with_table(
            TableDefinition::tenant("courses")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("plan_id", ColumnType::Uuid).nullable())
                .with_primary_key(["id"])
                .with_foreign_key(ForeignKeyDefinition::new("plan_id", "billing_plans", "id")),
        )
        .unwrap()
        .with_table(
            TableDefinition::tenant("enrollments")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("course_id", ColumnType::Uuid).indexed())
                .with_primary_key(["id"])
                .with_foreign_key(
                    ForeignKeyDefinition::new("course_id", "courses", "id")
                        .on_delete(ReferentialAction::Cascade),
                ),
        )
        .unwrap()
}

fn config() -> TenancyConfig {
    TenancyConfig {
        database: tenantry::DatabaseSettings::new("postgres://localhost/school"),
        ..TenancyConfig::default()
    }
}

async fn bootstrap() -> (Tenancy, Arc<InMemorySchemaProvider>, Arc<MockEngineFactory>) {
    let provider = Arc::new(InMemorySchemaProvider::new());
    let factory = Arc::new(MockEngineFactory::new());

    let tenancy = Tenancy::builder(config(), school_schema())
        .engine_factory(factory.clone())
        .schema_provider(provider.clone())
        .directory(Arc::new(InMemoryTenantDirectory::new()))
        .build()
        .await
        .unwrap();

    (tenancy, provider, factory)
}

// =============================================================================
// Tenant Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_create_then_resolve_tenant() {
    let (tenancy, provider, _) = bootstrap().await;

    let acme = tenancy
        .admin()
        .create_tenant(CreateTenantRequest::new("acme", "acme-corp"))
        .await
        .unwrap();

    let acme_ns = NamespaceName::new("acme").unwrap();
    assert_eq!(provider.tables_in(&acme_ns), ["courses", "enrollments"]);
    assert_eq!(
        provider.tables_in(&NamespaceName::global()),
        ["billing_plans", "tenants"]
    );

    let mut ctx = RequestContext::new().with_tenant_header("acme-corp");
    let session = tenancy.router().resolve_session(&mut ctx).await.unwrap();

    assert_eq!(session.namespace(), &acme_ns);
    assert_eq!(session.tenant_id(), Some(acme.id));
    session.commit().await.unwrap();
}

#[tokio::test]
async fn test_unknown_tenant_is_not_found() {
    let (tenancy, _, _) = bootstrap().await;
    tenancy
        .admin()
        .create_tenant(CreateTenantRequest::new("acme", "acme-corp"))
        .await
        .unwrap();

    let mut ctx = RequestContext::new().with_tenant_header("ghost-co");
    let err = tenancy.router().resolve_session(&mut ctx).await.unwrap_err();

    assert!(matches!(err, TenancyError::TenantNotFound(_)));
    assert_eq!(err.to_body().status, 404);
}

#[tokio::test]
async fn test_deactivation_blocks_new_sessions() {
    let (tenancy, provider, factory) = bootstrap().await;
    let acme = tenancy
        .admin()
        .create_tenant(CreateTenantRequest::new("acme", "acme-corp"))
        .await
        .unwrap();
    let acme_ns = acme.namespace().unwrap();

    let mut ctx = RequestContext::new().with_tenant_header("acme-corp");
    let session = tenancy.router().resolve_session(&mut ctx).await.unwrap();
    let engine = tenancy.registry().get_or_create_engine(&acme_ns).await.unwrap();
    session.close().await.unwrap();

    tenancy.admin().deactivate_tenant(acme.id).await.unwrap();
    assert!(engine.is_disposed());

    let checks_before = provider.check_calls();
    let mut ctx = RequestContext::new().with_tenant_header("acme-corp");
    let err = tenancy.router().resolve_session(&mut ctx).await.unwrap_err();

    assert!(matches!(err, TenancyError::TenantInactive(_)));
    assert_eq!(provider.check_calls(), checks_before);
    assert_eq!(factory.created_for(&acme_ns), 1);
    assert!(!tenancy.registry().contains(&acme_ns));

    // Reactivation makes the tenant reachable again on a fresh engine
    tenancy.admin().activate_tenant(acme.id).await.unwrap();
    let mut ctx = RequestContext::new().with_tenant_header("acme-corp");
    tenancy.router().resolve_session(&mut ctx).await.unwrap();
    assert_eq!(factory.created_for(&acme_ns), 2);
}

// =============================================================================
// Routing Tests
// =============================================================================

#[tokio::test]
async fn test_global_requests_use_public() {
    let (tenancy, _, _) = bootstrap().await;

    let mut ctx = RequestContext::from_headers([("X-Tenant-ID", "api")], tenancy.router().settings());
    let session = tenancy.router().resolve_session(&mut ctx).await.unwrap();

    assert!(session.is_global());
    assert!(require_global_context(session.context()).is_ok());
    assert_eq!(ctx.state(), &TenantContextState::Global);
}

#[tokio::test]
async fn test_missing_identifier() {
    let (tenancy, _, _) = bootstrap().await;

    let mut ctx = RequestContext::from_headers([("Host", "school.io")], tenancy.router().settings());
    let err = tenancy.router().resolve_session(&mut ctx).await.unwrap_err();

    assert!(matches!(err, TenancyError::TenantNotSpecified));
    assert_eq!(
        ctx.state(),
        &TenantContextState::Rejected { status: 400, code: "tenant_not_specified" }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_share_one_engine() {
    let (tenancy, provider, factory) = bootstrap().await;
    tenancy
        .admin()
        .create_tenant(CreateTenantRequest::new("acme", "acme-corp"))
        .await
        .unwrap();
    let tenancy = Arc::new(tenancy);

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let tenancy = Arc::clone(&tenancy);
            tokio::spawn(async move {
                let mut ctx = RequestContext::new().with_host("acme-corp.school.io");
                let session = tenancy.router().resolve_session(&mut ctx).await?;
                session.close().await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let acme_ns = NamespaceName::new("acme").unwrap();
    assert_eq!(factory.created_for(&acme_ns), 1);
    assert_eq!(provider.namespace_creations(), 1);
}

// =============================================================================
// Registry Tests
// =============================================================================

#[tokio::test]
async fn test_registry_clear_all_releases_pools() {
    let factory = Arc::new(MockEngineFactory::new());
    let registry = ConnectionRegistry::init(factory.clone()).await.unwrap();

    for name in ["alpha", "beta", "gamma"] {
        registry
            .get_or_create_engine(&NamespaceName::new(name).unwrap())
            .await
            .unwrap();
    }
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.clear_all().await.unwrap(), 3);
    assert!(registry.is_empty());
    assert_eq!(factory.total_created(), 4);
}

#[tokio::test]
async fn test_shutdown() {
    let (tenancy, _, _) = bootstrap().await;
    tenancy.shutdown().await.unwrap();
    assert!(tenancy.registry().global_engine().is_disposed());
}
