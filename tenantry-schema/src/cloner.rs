//! Binding the table model to a concrete namespace.
//!
//! Cloning is a pure transformation: tenant tables are copied into the
//! target namespace, global tables stay in `public`, and every foreign key
//! is rewritten to point at the right copy. An FK whose target cannot be
//! resolved is an error, never a warning.

use crate::ddl::CreationPlan;
use crate::definition::{ColumnDefinition, ReferentialAction, SchemaDefinition, TableDefinition, TableScope};
use crate::namespace::NamespaceName;
use crate::{SchemaError, SchemaResult};
use std::fmt;
use std::sync::Arc;

/// A table name qualified by its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTable {
    pub namespace: NamespaceName,
    pub name: String,
}

impl QualifiedTable {
    pub fn new(namespace: NamespaceName, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// A foreign key whose target has been resolved to a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub target: QualifiedTable,
    pub target_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// A table bound to a namespace, ready for DDL rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTable {
    table: QualifiedTable,
    scope: TableScope,
    columns: Vec<ColumnDefinition>,
    primary_key: Vec<String>,
    foreign_keys: Vec<BoundForeignKey>,
}

impl BoundTable {
    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn namespace(&self) -> &NamespaceName {
        &self.table.namespace
    }

    pub fn qualified(&self) -> &QualifiedTable {
        &self.table
    }

    pub fn scope(&self) -> TableScope {
        self.scope
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn foreign_keys(&self) -> &[BoundForeignKey] {
        &self.foreign_keys
    }

    /// Tables this one references, excluding itself.
    pub fn dependencies(&self) -> impl Iterator<Item = &QualifiedTable> {
        self.foreign_keys
            .iter()
            .map(|fk| &fk.target)
            .filter(move |target| *target != &self.table)
    }
}

/// The result of cloning a schema into one tenant namespace.
#[derive(Debug, Clone)]
pub struct ClonedSchema {
    namespace: NamespaceName,
    tables: Vec<BoundTable>,
    global_tables: Vec<QualifiedTable>,
}

impl ClonedSchema {
    pub fn namespace(&self) -> &NamespaceName {
        &self.namespace
    }

    /// Tenant tables bound to the target namespace, in definition order.
    pub fn tables(&self) -> &[BoundTable] {
        &self.tables
    }

    /// Look up a cloned table by canonical name.
    pub fn table(&self, name: &str) -> Option<&BoundTable> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Global tables the clone may reference. They are attached by
    /// reference and never created in the tenant namespace.
    pub fn global_tables(&self) -> &[QualifiedTable] {
        &self.global_tables
    }

    /// Tables ordered so referenced tables come first, with any keys that
    /// close a cycle deferred.
    pub fn creation_plan(&self) -> CreationPlan<'_> {
        crate::ddl::creation_plan(&self.tables)
    }
}

/// Produces per-namespace copies of a [`SchemaDefinition`].
#[derive(Debug, Clone)]
pub struct SchemaCloner {
    schema: Arc<SchemaDefinition>,
}

impl SchemaCloner {
    pub fn new(schema: SchemaDefinition) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// Bind every tenant table to `target` and resolve its foreign keys.
    pub fn clone_into(&self, target: &NamespaceName) -> SchemaResult<ClonedSchema> {
        if target.is_global() {
            return Err(SchemaError::InvalidNamespace {
                name: target.to_string(),
                reason: "tenant tables cannot be cloned into the global namespace".to_string(),
            });
        }

        let tables = self
            .schema
            .tenant_tables()
            .map(|table| self.bind(table, target))
            .collect::<SchemaResult<Vec<_>>>()?;

        let global_tables = self
            .schema
            .global_tables()
            .map(|table| QualifiedTable::new(NamespaceName::global(), &table.name))
            .collect();

        Ok(ClonedSchema {
            namespace: target.clone(),
            tables,
            global_tables,
        })
    }

    /// Bind the global tables to `public`. A global table may not reference
    /// a tenant table.
    pub fn bind_global(&self) -> SchemaResult<Vec<BoundTable>> {
        self.schema
            .global_tables()
            .map(|table| self.bind(table, &NamespaceName::global()))
            .collect()
    }

    fn bind(&self, table: &TableDefinition, namespace: &NamespaceName) -> SchemaResult<BoundTable> {
        let foreign_keys = table
            .foreign_keys
            .iter()
            .map(|fk| {
                let target = self.resolve_target(table, &fk.target_table)?;
                for column in &fk.target_columns {
                    if !target.has_column(column) {
                        return Err(SchemaError::UnknownColumn {
                            table: target.name.clone(),
                            column: column.clone(),
                        });
                    }
                }

                let target_namespace = match target.scope {
                    TableScope::Global => NamespaceName::global(),
                    TableScope::Tenant => namespace.clone(),
                };

                Ok(BoundForeignKey {
                    name: fk.constraint_name(&table.name),
                    columns: fk.columns.clone(),
                    target: QualifiedTable::new(target_namespace, &target.name),
                    target_columns: fk.target_columns.clone(),
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(BoundTable {
            table: QualifiedTable::new(namespace.clone(), &table.name),
            scope: table.scope,
            columns: table.columns.clone(),
            primary_key: table.primary_key.clone(),
            foreign_keys,
        })
    }

    /// Global targets resolve from anywhere. Tenant targets resolve only
    /// from tenant tables, to the copy in the same namespace.
    fn resolve_target(&self, owner: &TableDefinition, target: &str) -> SchemaResult<&TableDefinition> {
        match self.schema.table(target) {
            Some(table) if table.scope == TableScope::Global => Ok(table),
            Some(table) if owner.scope == TableScope::Tenant => Ok(table),
            _ => Err(SchemaError::DanglingForeignKey {
                table: owner.name.clone(),
                target: target.to_string(),
            }),
        }
    }
}
