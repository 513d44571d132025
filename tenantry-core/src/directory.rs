//! Tenant directory.
//!
//! The registry of tenants lives in the global namespace. Each record maps
//! a public identifier (the subdomain clients send) to the namespace that
//! holds the tenant's data.
//!
//! ```
//! # tokio_test::block_on(async {
//! use tenantry_core::directory::{InMemoryTenantDirectory, TenantDirectory, TenantRecord};
//!
//! let directory = InMemoryTenantDirectory::new();
//! directory.insert(TenantRecord::new("acme", "acme-corp")).await?;
//!
//! let tenant = directory.find_by_public_identifier("acme-corp").await?;
//! assert_eq!(tenant.map(|t| t.namespace_name), Some("acme".to_string()));
//! # Ok::<(), tenantry_core::TenancyError>(())
//! # }).unwrap();
//! ```

use crate::{TenancyError, TenancyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tenantry_schema::{ColumnDefault, ColumnDefinition, ColumnType, NamespaceName, TableDefinition};
use uuid::Uuid;

/// Name of the directory table in `public`.
pub const TENANTS_TABLE: &str = "tenants";

/// One tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Internal identifier. Never changes.
    pub id: Uuid,
    /// Physical namespace. Never changes.
    pub namespace_name: String,
    /// Identifier clients send. Changed only through an explicit rename.
    pub public_identifier: String,
    pub is_active: bool,
    pub billing_tier: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    /// New active tenant on the `basic` tier.
    pub fn new(namespace_name: impl Into<String>, public_identifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace_name: namespace_name.into(),
            public_identifier: public_identifier.into(),
            is_active: true,
            billing_tier: "basic".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_billing_tier(mut self, tier: impl Into<String>) -> Self {
        self.billing_tier = tier.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Validated namespace for this tenant.
    pub fn namespace(&self) -> TenancyResult<NamespaceName> {
        NamespaceName::new(&self.namespace_name).map_err(|err| TenancyError::Provisioning {
            namespace: self.namespace_name.clone(),
            reason: err.to_string(),
        })
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Filters for listing tenants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantFilter {
    pub active_only: bool,
    /// Substring match on the public identifier or namespace name.
    pub search: Option<String>,
    pub billing_tier: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for TenantFilter {
    fn default() -> Self {
        Self {
            active_only: false,
            search: None,
            billing_tier: None,
            offset: 0,
            limit: 100,
        }
    }
}

impl TenantFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into().to_lowercase());
        self
    }

    pub fn billing_tier(mut self, tier: impl Into<String>) -> Self {
        self.billing_tier = Some(tier.into());
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Check if a record passes every filter (pagination aside).
    pub fn matches(&self, record: &TenantRecord) -> bool {
        if self.active_only && !record.is_active {
            return false;
        }
        if let Some(tier) = &self.billing_tier {
            if &record.billing_tier != tier {
                return false;
            }
        }
        if let Some(term) = &self.search {
            return record.public_identifier.contains(term.as_str())
                || record.namespace_name.contains(term.as_str());
        }
        true
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        ((self.offset + self.items.len()) as u64) < self.total
    }
}

/// Storage for tenant records.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> TenancyResult<Option<TenantRecord>>;

    async fn find_by_public_identifier(&self, identifier: &str) -> TenancyResult<Option<TenantRecord>>;

    async fn find_by_namespace(&self, namespace_name: &str) -> TenancyResult<Option<TenantRecord>>;

    /// Insert a new record. Fails with `Conflict` when either unique key
    /// is taken.
    async fn insert(&self, record: TenantRecord) -> TenancyResult<TenantRecord>;

    /// Replace an existing record. Fails with `TenantNotFound` when the
    /// id is unknown.
    async fn update(&self, record: TenantRecord) -> TenancyResult<TenantRecord>;

    /// Records matching `filter`, ordered by creation time.
    async fn list(&self, filter: &TenantFilter) -> TenancyResult<Page<TenantRecord>>;

    async fn count(&self) -> TenancyResult<u64>;
}

/// Directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    records: RwLock<HashMap<Uuid, TenantRecord>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let directory = Self::new();
        {
            let mut map = directory.records.write();
            for record in records {
                map.insert(record.id, record);
            }
        }
        directory
    }

    fn conflict(existing: &HashMap<Uuid, TenantRecord>, record: &TenantRecord) -> Option<TenancyError> {
        existing.values().filter(|r| r.id != record.id).find_map(|r| {
            if r.public_identifier == record.public_identifier {
                Some(TenancyError::Conflict(format!(
                    "public identifier '{}' is already in use",
                    record.public_identifier
                )))
            } else if r.namespace_name == record.namespace_name {
                Some(TenancyError::Conflict(format!(
                    "namespace '{}' is already in use",
                    record.namespace_name
                )))
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn find_by_id(&self, id: Uuid) -> TenancyResult<Option<TenantRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find_by_public_identifier(&self, identifier: &str) -> TenancyResult<Option<TenantRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.public_identifier == identifier)
            .cloned())
    }

    async fn find_by_namespace(&self, namespace_name: &str) -> TenancyResult<Option<TenantRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.namespace_name == namespace_name)
            .cloned())
    }

    async fn insert(&self, record: TenantRecord) -> TenancyResult<TenantRecord> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(TenancyError::Conflict(format!("tenant {} already exists", record.id)));
        }
        if let Some(err) = Self::conflict(&records, &record) {
            return Err(err);
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: TenantRecord) -> TenancyResult<TenantRecord> {
        let mut records = self.records.write();
        if !records.contains_key(&record.id) {
            return Err(TenancyError::TenantNotFound(record.id.to_string()));
        }
        if let Some(err) = Self::conflict(&records, &record) {
            return Err(err);
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list(&self, filter: &TenantFilter) -> TenancyResult<Page<TenantRecord>> {
        let mut matching: Vec<TenantRecord> = self
            .records
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.public_identifier.cmp(&b.public_identifier))
        });

        let total = matching.len() as u64;
        let items = matching.into_iter().skip(filter.offset).take(filter.limit).collect();

        Ok(Page {
            items,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    async fn count(&self) -> TenancyResult<u64> {
        Ok(self.records.read().len() as u64)
    }
}

/// Definition of `public.tenants`, added to every schema that lacks it.
pub fn tenants_table() -> TableDefinition {
    TableDefinition::global(TENANTS_TABLE)
        .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
        .with_column(ColumnDefinition::new("namespace_name", ColumnType::String(63)).unique())
        .with_column(ColumnDefinition::new("public_identifier", ColumnType::String(63)).unique())
        .with_column(
            ColumnDefinition::new("is_active", ColumnType::Boolean)
                .with_default(ColumnDefault::Boolean(true))
                .indexed(),
        )
        .with_column(
            ColumnDefinition::new("billing_tier", ColumnType::String(32))
                .with_default(ColumnDefault::Text("basic".to_string())),
        )
        .with_column(
            ColumnDefinition::new("created_at", ColumnType::TimestampTz)
                .with_default(ColumnDefault::CurrentTimestamp),
        )
        .with_column(
            ColumnDefinition::new("updated_at", ColumnType::TimestampTz)
                .with_default(ColumnDefault::CurrentTimestamp),
        )
        .with_primary_key(["id"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> TenantRecord {
        TenantRecord::new("acme", "acme-corp")
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let directory = InMemoryTenantDirectory::new();
        let record = directory.insert(acme()).await.unwrap();

        let by_id = directory.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(by_id.namespace_name, "acme");

        let by_identifier = directory.find_by_public_identifier("acme-corp").await.unwrap();
        assert_eq!(by_identifier.map(|r| r.id), Some(record.id));

        let by_namespace = directory.find_by_namespace("acme").await.unwrap();
        assert_eq!(by_namespace.map(|r| r.id), Some(record.id));

        assert!(directory.find_by_public_identifier("ghost-co").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_keys() {
        let directory = InMemoryTenantDirectory::new();
        directory.insert(acme()).await.unwrap();

        let err = directory.insert(TenantRecord::new("acme_two", "acme-corp")).await.unwrap_err();
        assert!(matches!(err, TenancyError::Conflict(_)));

        let err = directory.insert(TenantRecord::new("acme", "acme-two")).await.unwrap_err();
        assert!(matches!(err, TenancyError::Conflict(_)));
        assert_eq!(directory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_tenant() {
        let directory = InMemoryTenantDirectory::new();
        let err = directory.update(acme()).await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let directory = InMemoryTenantDirectory::with_records([
            TenantRecord::new("alpha", "alpha-school"),
            TenantRecord::new("beta", "beta-school").with_billing_tier("premium"),
            TenantRecord::new("gamma", "gamma-academy").inactive(),
        ]);

        let all = directory.list(&TenantFilter::new()).await.unwrap();
        assert_eq!(all.total, 3);

        let active = directory.list(&TenantFilter::new().active_only()).await.unwrap();
        assert_eq!(active.total, 2);

        let schools = directory.list(&TenantFilter::new().search("School")).await.unwrap();
        assert_eq!(schools.total, 2);

        let premium = directory.list(&TenantFilter::new().billing_tier("premium")).await.unwrap();
        assert_eq!(premium.items[0].namespace_name, "beta");

        let page = directory.list(&TenantFilter::new().page(0, 2)).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more());

        let last = directory.list(&TenantFilter::new().page(2, 2)).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more());
    }

    #[test]
    fn test_record_namespace() {
        assert_eq!(acme().namespace().unwrap().as_str(), "acme");

        let broken = TenantRecord::new("Bad Name", "bad");
        assert!(matches!(broken.namespace(), Err(TenancyError::Provisioning { .. })));
    }

    #[test]
    fn test_tenants_table_is_global() {
        let table = tenants_table();
        assert!(table.is_global());
        assert!(table.validate().is_ok());
        assert!(table.has_column("public_identifier"));
    }
}
