//! Error types for schema definition and cloning.

use thiserror::Error;

/// Errors raised while building or cloning a schema definition.
///
/// None of these are recoverable at runtime: they describe a table model
/// that cannot be materialized as written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Namespace name is not a usable PostgreSQL identifier.
    #[error("Invalid namespace name {name:?}: {reason}")]
    InvalidNamespace {
        /// Offending name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A table with this name was already added.
    #[error("Duplicate table: {0}")]
    DuplicateTable(String),

    /// A column with this name was already added to the table.
    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A key or foreign key names a column that does not exist.
    #[error("Unknown column {column} in table {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Foreign key points at a table that is neither cloned nor global.
    #[error("Foreign key on {table} references unresolvable table {target}")]
    DanglingForeignKey {
        /// Table owning the foreign key.
        table: String,
        /// Canonical name of the missing target.
        target: String,
    },

    /// Foreign key column lists differ in length.
    #[error("Foreign key on {table} maps {local} columns onto {target} columns")]
    ForeignKeyArity {
        /// Table owning the foreign key.
        table: String,
        /// Number of local columns.
        local: usize,
        /// Number of target columns.
        target: usize,
    },
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
