//! SeaORM storage for the tenant directory.

use crate::directory::{Page, TenantDirectory, TenantFilter, TenantRecord};
use crate::engine::Engine;
use crate::{TenancyError, TenancyResult};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// `public.tenants`
pub mod tenant {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(schema_name = "public", table_name = "tenants")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub namespace_name: String,
        #[sea_orm(unique)]
        pub public_identifier: String,
        pub is_active: bool,
        pub billing_tier: String,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

impl From<tenant::Model> for TenantRecord {
    fn from(model: tenant::Model) -> Self {
        Self {
            id: model.id,
            namespace_name: model.namespace_name,
            public_identifier: model.public_identifier,
            is_active: model.is_active,
            billing_tier: model.billing_tier,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<TenantRecord> for tenant::Model {
    fn from(record: TenantRecord) -> Self {
        Self {
            id: record.id,
            namespace_name: record.namespace_name,
            public_identifier: record.public_identifier,
            is_active: record.is_active,
            billing_tier: record.billing_tier,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// [`TenantDirectory`] backed by `public.tenants`, queried through the
/// global engine.
pub struct SeaOrmTenantDirectory {
    engine: Arc<Engine>,
}

impl SeaOrmTenantDirectory {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    async fn find_one(&self, condition: Condition) -> TenancyResult<Option<TenantRecord>> {
        let model = tenant::Entity::find()
            .filter(condition)
            .one(self.engine.connection())
            .await?;
        Ok(model.map(Into::into))
    }

    /// Fail with `Conflict` if another tenant holds either unique key.
    async fn check_unique(&self, record: &TenantRecord) -> TenancyResult<()> {
        if let Some(other) = self.find_by_public_identifier(&record.public_identifier).await? {
            if other.id != record.id {
                return Err(TenancyError::Conflict(format!(
                    "public identifier '{}' is already in use",
                    record.public_identifier
                )));
            }
        }

        if let Some(other) = self.find_by_namespace(&record.namespace_name).await? {
            if other.id != record.id {
                return Err(TenancyError::Conflict(format!(
                    "namespace '{}' is already in use",
                    record.namespace_name
                )));
            }
        }

        Ok(())
    }
}

/// A concurrent writer can still win between the check and the write.
fn write_error(err: DbErr, record: &TenantRecord) -> TenancyError {
    match err {
        DbErr::RecordNotUpdated => TenancyError::TenantNotFound(record.id.to_string()),
        err => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => TenancyError::Conflict(detail),
            _ => err.into(),
        },
    }
}

#[async_trait]
impl TenantDirectory for SeaOrmTenantDirectory {
    async fn find_by_id(&self, id: Uuid) -> TenancyResult<Option<TenantRecord>> {
        let model = tenant::Entity::find_by_id(id)
            .one(self.engine.connection())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_public_identifier(&self, identifier: &str) -> TenancyResult<Option<TenantRecord>> {
        self.find_one(Condition::all().add(tenant::Column::PublicIdentifier.eq(identifier)))
            .await
    }

    async fn find_by_namespace(&self, namespace_name: &str) -> TenancyResult<Option<TenantRecord>> {
        self.find_one(Condition::all().add(tenant::Column::NamespaceName.eq(namespace_name)))
            .await
    }

    async fn insert(&self, record: TenantRecord) -> TenancyResult<TenantRecord> {
        self.check_unique(&record).await?;

        let active = tenant::Model::from(record.clone()).into_active_model().reset_all();
        let model = active
            .insert(self.engine.connection())
            .await
            .map_err(|e| write_error(e, &record))?;

        debug!(tenant_id = %model.id, namespace = %model.namespace_name, "Tenant record inserted");
        Ok(model.into())
    }

    async fn update(&self, record: TenantRecord) -> TenancyResult<TenantRecord> {
        self.check_unique(&record).await?;

        let active = tenant::Model::from(record.clone()).into_active_model().reset_all();
        let model = active
            .update(self.engine.connection())
            .await
            .map_err(|e| write_error(e, &record))?;

        debug!(tenant_id = %model.id, "Tenant record updated");
        Ok(model.into())
    }

    async fn list(&self, filter: &TenantFilter) -> TenancyResult<Page<TenantRecord>> {
        let mut condition = Condition::all();
        if filter.active_only {
            condition = condition.add(tenant::Column::IsActive.eq(true));
        }
        if let Some(tier) = &filter.billing_tier {
            condition = condition.add(tenant::Column::BillingTier.eq(tier.as_str()));
        }
        if let Some(term) = &filter.search {
            condition = condition.add(
                Condition::any()
                    .add(tenant::Column::PublicIdentifier.contains(term.as_str()))
                    .add(tenant::Column::NamespaceName.contains(term.as_str())),
            );
        }

        let conn = self.engine.connection();
        let query = tenant::Entity::find().filter(condition);
        let total = query.clone().count(conn).await?;

        let items = query
            .order_by_asc(tenant::Column::CreatedAt)
            .order_by_asc(tenant::Column::PublicIdentifier)
            .offset(filter.offset as u64)
            .limit(filter.limit as u64)
            .all(conn)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(Page {
            items,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    async fn count(&self) -> TenancyResult<u64> {
        Ok(tenant::Entity::find().count(self.engine.connection()).await?)
    }
}
