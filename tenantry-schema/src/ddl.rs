//! DDL rendering for bound tables.
//!
//! Every statement is idempotent (`IF NOT EXISTS`) so provisioning can be
//! retried after a partial failure and raced by concurrent callers. The one
//! exception is a deferred foreign key: PostgreSQL has no `IF NOT EXISTS`
//! for constraints, so callers check the catalog before adding it.

use crate::cloner::{BoundForeignKey, BoundTable, QualifiedTable};
use crate::definition::{ColumnDefault, ColumnDefinition, ColumnType, ReferentialAction};
use sea_query::{
    Alias, ColumnDef, Expr, ForeignKey, ForeignKeyAction, ForeignKeyCreateStatement, Index,
    IndexCreateStatement, PostgresQueryBuilder, SchemaStatementBuilder, Table, TableCreateStatement,
};
use std::collections::HashSet;

impl QualifiedTable {
    fn table_ref(&self) -> (Alias, Alias) {
        (Alias::new(self.namespace.as_str()), Alias::new(&self.name))
    }
}

impl BoundTable {
    /// `CREATE TABLE IF NOT EXISTS "<ns>"."<table>" (...)`
    pub fn create_statement(&self) -> TableCreateStatement {
        self.create_statement_without(&[])
    }

    /// Like [`create_statement`](Self::create_statement), leaving out the
    /// named foreign key constraints.
    pub fn create_statement_without(&self, deferred: &[&str]) -> TableCreateStatement {
        let mut stmt = Table::create();
        stmt.table(self.qualified().table_ref()).if_not_exists();

        for column in self.columns() {
            stmt.col(&mut column_def(column));
        }

        if !self.primary_key().is_empty() {
            let mut pk = Index::create();
            for column in self.primary_key() {
                pk.col(Alias::new(column));
            }
            stmt.primary_key(&mut pk);
        }

        for fk in self.foreign_keys() {
            if deferred.contains(&fk.name.as_str()) {
                continue;
            }
            stmt.foreign_key(&mut foreign_key(fk));
        }

        stmt
    }

    /// Secondary indexes for columns flagged `indexed`. Unique and primary
    /// key columns are already backed by an index.
    pub fn index_statements(&self) -> Vec<IndexCreateStatement> {
        self.columns()
            .iter()
            .filter(|c| c.indexed && !c.unique && !self.primary_key().contains(&c.name))
            .map(|c| {
                Index::create()
                    .if_not_exists()
                    .name(format!("idx_{}_{}", self.name(), c.name))
                    .table(self.qualified().table_ref())
                    .col(Alias::new(&c.name))
                    .to_owned()
            })
            .collect()
    }

    /// PostgreSQL text of [`create_statement`](Self::create_statement).
    pub fn create_sql(&self) -> String {
        self.create_statement().build(PostgresQueryBuilder)
    }

    /// PostgreSQL text of [`create_statement_without`](Self::create_statement_without).
    pub fn create_sql_without(&self, deferred: &[&str]) -> String {
        self.create_statement_without(deferred).build(PostgresQueryBuilder)
    }

    /// PostgreSQL text of [`index_statements`](Self::index_statements).
    pub fn index_sql(&self) -> Vec<String> {
        self.index_statements()
            .iter()
            .map(|stmt| stmt.build(PostgresQueryBuilder))
            .collect()
    }
}

/// `CREATE SCHEMA IF NOT EXISTS "<ns>"`
pub fn create_namespace_sql(namespace: &crate::NamespaceName) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", namespace.as_str())
}

/// A foreign key added with `ALTER TABLE` once both tables exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredForeignKey<'a> {
    pub table: &'a BoundTable,
    pub foreign_key: &'a BoundForeignKey,
}

impl DeferredForeignKey<'_> {
    /// Constraint name, as recorded in the catalog.
    pub fn name(&self) -> &str {
        &self.foreign_key.name
    }

    /// `ALTER TABLE "<ns>"."<table>" ADD CONSTRAINT ... FOREIGN KEY ...`
    pub fn add_statement(&self) -> ForeignKeyCreateStatement {
        let mut stmt = foreign_key(self.foreign_key);
        stmt.from_tbl(self.table.qualified().table_ref());
        stmt
    }

    pub fn add_sql(&self) -> String {
        self.add_statement().build(PostgresQueryBuilder)
    }
}

/// How to create a set of tables whose foreign keys may form cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct CreationPlan<'a> {
    /// Tables ordered so every referenced table precedes the tables that
    /// reference it, once deferred keys are left out.
    pub tables: Vec<&'a BoundTable>,
    /// Keys that close a cycle, added after every table exists.
    pub deferred: Vec<DeferredForeignKey<'a>>,
}

impl<'a> CreationPlan<'a> {
    /// Names of the keys deferred for `table`.
    pub fn deferred_for(&self, table: &BoundTable) -> Vec<&'a str> {
        self.deferred
            .iter()
            .filter(|d| d.table.qualified() == table.qualified())
            .map(|d| d.foreign_key)
            .map(|fk| fk.name.as_str())
            .collect()
    }

    /// `CREATE TABLE` text for `table`, without its deferred keys.
    pub fn create_sql(&self, table: &BoundTable) -> String {
        table.create_sql_without(&self.deferred_for(table))
    }
}

/// Plan table creation. References outside `tables` and self references
/// impose no ordering. Ties keep definition order. When the remaining
/// tables only reference each other, the first of them in definition order
/// is created without the keys pointing at tables not yet created, and
/// those keys are deferred.
pub fn creation_plan(tables: &[BoundTable]) -> CreationPlan<'_> {
    let members: HashSet<&QualifiedTable> = tables.iter().map(BoundTable::qualified).collect();
    let mut created: HashSet<&QualifiedTable> = HashSet::with_capacity(tables.len());
    let mut remaining: Vec<&BoundTable> = tables.iter().collect();
    let mut plan = CreationPlan {
        tables: Vec::with_capacity(tables.len()),
        deferred: Vec::new(),
    };

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|table| {
            table
                .dependencies()
                .all(|dep| !members.contains(dep) || created.contains(dep))
        });

        let table = match ready {
            Some(i) => remaining.remove(i),
            None => {
                let table = remaining.remove(0);
                for fk in table.foreign_keys() {
                    if fk.target != *table.qualified()
                        && members.contains(&fk.target)
                        && !created.contains(&fk.target)
                    {
                        plan.deferred.push(DeferredForeignKey { table, foreign_key: fk });
                    }
                }
                table
            }
        };

        created.insert(table.qualified());
        plan.tables.push(table);
    }

    plan
}

fn foreign_key(fk: &BoundForeignKey) -> ForeignKeyCreateStatement {
    let mut key = ForeignKey::create();
    key.name(&fk.name)
        .to_tbl(fk.target.table_ref())
        .on_delete(action(fk.on_delete))
        .on_update(action(fk.on_update));
    for column in &fk.columns {
        key.from_col(Alias::new(column));
    }
    for column in &fk.target_columns {
        key.to_col(Alias::new(column));
    }
    key
}

fn column_def(column: &ColumnDefinition) -> ColumnDef {
    let mut def = ColumnDef::new(Alias::new(&column.name));

    match column.column_type {
        ColumnType::Uuid => def.uuid(),
        ColumnType::Text => def.text(),
        ColumnType::String(len) => def.string_len(len),
        ColumnType::Boolean => def.boolean(),
        ColumnType::Integer => def.integer(),
        ColumnType::BigInteger => def.big_integer(),
        ColumnType::Double => def.double(),
        ColumnType::Date => def.date(),
        ColumnType::TimestampTz => def.timestamp_with_time_zone(),
        ColumnType::Json => def.json_binary(),
    };

    if column.nullable {
        def.null();
    } else {
        def.not_null();
    }

    if column.unique {
        def.unique_key();
    }

    match &column.default {
        Some(ColumnDefault::CurrentTimestamp) => {
            def.default(Expr::current_timestamp());
        }
        Some(ColumnDefault::RandomUuid) => {
            def.default(Expr::cust("gen_random_uuid()"));
        }
        Some(ColumnDefault::Boolean(value)) => {
            def.default(*value);
        }
        Some(ColumnDefault::Integer(value)) => {
            def.default(*value);
        }
        Some(ColumnDefault::Text(value)) => {
            def.default(value.clone());
        }
        None => {}
    }

    def
}

fn action(action: ReferentialAction) -> ForeignKeyAction {
    match action {
        ReferentialAction::NoAction => ForeignKeyAction::NoAction,
        ReferentialAction::Restrict => ForeignKeyAction::Restrict,
        ReferentialAction::Cascade => ForeignKeyAction::Cascade,
        ReferentialAction::SetNull => ForeignKeyAction::SetNull,
    }
}
