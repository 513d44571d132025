//! # Tenantry Schema
//!
//! Declarative table model and per-tenant schema cloning.
//!
//! A [`SchemaDefinition`] describes every table once. Tables tagged
//! [`TableScope::Tenant`] are copied into each tenant namespace by the
//! [`SchemaCloner`]; tables tagged [`TableScope::Global`] live in `public`
//! and are shared. Foreign keys are rewritten during cloning so tenant
//! tables reference their siblings in the same namespace and global tables
//! in `public`.
//!
//! Nothing here touches a database. The output of a clone renders to
//! idempotent PostgreSQL DDL via `sea-query`.
//!
//! ```rust
//! use tenantry_schema::prelude::*;
//!
//! let schema = SchemaDefinition::new()
//!     .with_table(
//!         TableDefinition::tenant("roles")
//!             .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
//!             .with_primary_key(["id"]),
//!     )?;
//!
//! let cloned = SchemaCloner::new(schema).clone_into(&NamespaceName::new("acme")?)?;
//! let sql = cloned.table("roles").unwrap().create_sql();
//! assert!(sql.contains(r#""acme"."roles""#));
//! # Ok::<(), SchemaError>(())
//! ```

#![warn(clippy::all)]

pub mod cloner;
pub mod ddl;
pub mod definition;
pub mod error;
pub mod namespace;

pub use cloner::{BoundForeignKey, BoundTable, ClonedSchema, QualifiedTable, SchemaCloner};
pub use ddl::{CreationPlan, DeferredForeignKey, create_namespace_sql, creation_plan};
pub use definition::{
    ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition, ReferentialAction,
    SchemaDefinition, TableDefinition, TableScope,
};
pub use error::{SchemaError, SchemaResult};
pub use namespace::{GLOBAL_NAMESPACE, NamespaceName};

/// Prelude module for commonly used types.
pub mod prelude {
    pub use crate::{
        ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition, NamespaceName,
        ReferentialAction, SchemaCloner, SchemaDefinition, SchemaError, TableDefinition,
        TableScope,
    };
}
