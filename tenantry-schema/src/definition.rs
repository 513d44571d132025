//! Declarative table model.
//!
//! Tables are described once, by canonical name, and tagged with the scope
//! they live in. The cloner turns tenant-scoped tables into copies bound to
//! a concrete namespace; global tables always live in `public`.
//!
//! ```rust
//! use tenantry_schema::{ColumnDefinition, ColumnType, ForeignKeyDefinition, SchemaDefinition, TableDefinition};
//!
//! let schema = SchemaDefinition::new()
//!     .with_table(
//!         TableDefinition::global("schools")
//!             .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
//!             .with_primary_key(["id"]),
//!     )?
//!     .with_table(
//!         TableDefinition::tenant("courses")
//!             .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
//!             .with_column(ColumnDefinition::new("school_id", ColumnType::Uuid))
//!             .with_primary_key(["id"])
//!             .with_foreign_key(ForeignKeyDefinition::new("school_id", "schools", "id")),
//!     )?;
//!
//! assert_eq!(schema.tenant_tables().count(), 1);
//! # Ok::<(), tenantry_schema::SchemaError>(())
//! ```

use crate::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a table lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableScope {
    /// Shared by every tenant, stored in `public`.
    Global,
    /// Copied into every tenant namespace.
    Tenant,
}

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Uuid,
    Text,
    /// `varchar(n)`
    String(u32),
    Boolean,
    Integer,
    BigInteger,
    Double,
    Date,
    TimestampTz,
    Json,
}

/// Server-side default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    CurrentTimestamp,
    /// `gen_random_uuid()`
    RandomUuid,
    Boolean(bool),
    Integer(i64),
    Text(String),
}

/// Action taken on referencing rows when the referenced row goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

/// A single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub default: Option<ColumnDefault>,
}

impl ColumnDefinition {
    /// A `NOT NULL` column without default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            unique: false,
            indexed: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// A foreign key, naming its target table by canonical (unqualified) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    pub columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeyDefinition {
    /// Single-column foreign key.
    pub fn new(
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self::composite([column.into()], target_table, [target_column.into()])
    }

    /// Multi-column foreign key.
    pub fn composite<I, J>(columns: I, target_table: impl Into<String>, target_columns: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            target_table: target_table.into(),
            target_columns: target_columns.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Constraint name, unique within the owning table's namespace.
    pub fn constraint_name(&self, table: &str) -> String {
        format!("fk_{}_{}_{}", table, self.columns.join("_"), self.target_table)
    }
}

/// One table in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub scope: TableScope,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, scope: TableScope) -> Self {
        Self {
            name: name.into(),
            scope,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// A table shared by all tenants.
    pub fn global(name: impl Into<String>) -> Self {
        Self::new(name, TableScope::Global)
    }

    /// A table copied into every tenant namespace.
    pub fn tenant(name: impl Into<String>) -> Self {
        Self::new(name, TableScope::Tenant)
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKeyDefinition) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_global(&self) -> bool {
        self.scope == TableScope::Global
    }

    /// Check the table on its own: unique column names, and key columns
    /// that exist. Foreign key targets are checked when cloning.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let fk_columns = self.foreign_keys.iter().flat_map(|fk| fk.columns.iter());
        for column in self.primary_key.iter().chain(fk_columns) {
            if !self.has_column(column) {
                return Err(SchemaError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }

        for fk in &self.foreign_keys {
            if fk.columns.len() != fk.target_columns.len() || fk.columns.is_empty() {
                return Err(SchemaError::ForeignKeyArity {
                    table: self.name.clone(),
                    local: fk.columns.len(),
                    target: fk.target_columns.len(),
                });
            }
        }

        Ok(())
    }
}

/// The full table model handed to the cloner.
///
/// Deserialized models go through [`add_table`](SchemaDefinition::add_table)
/// like built ones, so a malformed table fails at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchemaDefinition")]
pub struct SchemaDefinition {
    tables: Vec<TableDefinition>,
}

#[derive(Deserialize)]
struct RawSchemaDefinition {
    #[serde(default)]
    tables: Vec<TableDefinition>,
}

impl TryFrom<RawSchemaDefinition> for SchemaDefinition {
    type Error = SchemaError;

    fn try_from(raw: RawSchemaDefinition) -> SchemaResult<Self> {
        let mut schema = Self::new();
        for table in raw.tables {
            schema.add_table(table)?;
        }
        Ok(schema)
    }
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, rejecting duplicates and malformed tables.
    pub fn add_table(&mut self, table: TableDefinition) -> SchemaResult<()> {
        if self.contains(&table.name) {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        table.validate()?;
        self.tables.push(table);
        Ok(())
    }

    /// Builder form of [`add_table`](Self::add_table).
    pub fn with_table(mut self, table: TableDefinition) -> SchemaResult<Self> {
        self.add_table(table)?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables in insertion order.
    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn tenant_tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().filter(|t| t.scope == TableScope::Tenant)
    }

    pub fn global_tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().filter(|t| t.scope == TableScope::Global)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDefinition {
        TableDefinition::tenant("users")
            .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
            .with_column(ColumnDefinition::new("email", ColumnType::String(255)).unique())
            .with_primary_key(["id"])
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = SchemaDefinition::new()
            .with_table(users())
            .unwrap()
            .with_table(users())
            .unwrap_err();

        assert_eq!(err, SchemaError::DuplicateTable("users".to_string()));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let table = users().with_column(ColumnDefinition::new("email", ColumnType::Text));
        let err = SchemaDefinition::new().with_table(table).unwrap_err();

        assert!(matches!(err, SchemaError::DuplicateColumn { ref column, .. } if column == "email"));
    }

    #[test]
    fn test_unknown_key_columns_rejected() {
        let table = users().with_primary_key(["uuid"]);
        assert!(matches!(table.validate(), Err(SchemaError::UnknownColumn { .. })));

        let table = users().with_foreign_key(ForeignKeyDefinition::new("role_id", "roles", "id"));
        assert!(matches!(table.validate(), Err(SchemaError::UnknownColumn { .. })));
    }

    #[test]
    fn test_foreign_key_arity() {
        let table = users().with_foreign_key(ForeignKeyDefinition::composite(
            ["id", "email"],
            "accounts",
            ["id"],
        ));
        assert!(matches!(
            table.validate(),
            Err(SchemaError::ForeignKeyArity { local: 2, target: 1, .. })
        ));
    }

    #[test]
    fn test_scope_filters() {
        let schema = SchemaDefinition::new()
            .with_table(users())
            .unwrap()
            .with_table(
                TableDefinition::global("tenants")
                    .with_column(ColumnDefinition::new("id", ColumnType::Uuid)),
            )
            .unwrap();

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.tenant_tables().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["users"]);
        assert_eq!(schema.global_tables().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["tenants"]);
    }

    #[test]
    fn test_deserialized_schema_is_validated() {
        let json = r#"{
            "tables": [
                {
                    "name": "roles",
                    "scope": "tenant",
                    "columns": [{ "name": "id", "column_type": "uuid" }],
                    "primary_key": ["nope"]
                }
            ]
        }"#;
        let err = serde_json::from_str::<SchemaDefinition>(json).unwrap_err();
        assert!(err.to_string().contains("Unknown column nope"), "{err}");

        let json = r#"{
            "tables": [
                {
                    "name": "users",
                    "scope": "tenant",
                    "columns": [{ "name": "role_id", "column_type": "uuid" }],
                    "foreign_keys": [
                        { "columns": ["role_id", "x"], "target_table": "roles", "target_columns": ["id"] }
                    ]
                }
            ]
        }"#;
        assert!(serde_json::from_str::<SchemaDefinition>(json).is_err());

        let json = r#"{ "tables": [
            { "name": "users", "scope": "tenant", "columns": [{ "name": "id", "column_type": "uuid" }] },
            { "name": "users", "scope": "global", "columns": [] }
        ] }"#;
        let err = serde_json::from_str::<SchemaDefinition>(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate table: users"), "{err}");
    }

    #[test]
    fn test_schema_serde_keeps_tables() {
        let schema = SchemaDefinition::new().with_table(users()).unwrap();
        let json = serde_json::to_string(&schema).unwrap();
        let loaded: SchemaDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, schema);
    }

    #[test]
    fn test_constraint_name() {
        let fk = ForeignKeyDefinition::new("school_id", "schools", "id");
        assert_eq!(fk.constraint_name("courses"), "fk_courses_school_id_schools");
    }
}
