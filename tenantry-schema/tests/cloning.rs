//! Cloning a realistic school schema into tenant namespaces.

use tenantry_schema::prelude::*;
use tenantry_schema::QualifiedTable;

fn school_schema() -> SchemaDefinition {
    SchemaDefinition::new()
        .with_table(
            TableDefinition::global("tenants")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("namespace_name", ColumnType::String(63)).unique())
                .with_primary_key(["id"]),
        )
        .unwrap()
        .with_table(
            TableDefinition::global("global_users")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("email", ColumnType::String(255)).unique())
                .with_primary_key(["id"]),
        )
        .unwrap()
        .with_table(
            TableDefinition::tenant("schools")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("name", ColumnType::Text))
                .with_column(ColumnDefinition::new("owner_id", ColumnType::Uuid).nullable())
                .with_primary_key(["id"])
                .with_foreign_key(ForeignKeyDefinition::new("owner_id", "global_users", "id")),
        )
        .unwrap()
        .with_table(
            TableDefinition::tenant("courses")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("school_id", ColumnType::Uuid).indexed())
                .with_primary_key(["id"])
                .with_foreign_key(
                    ForeignKeyDefinition::new("school_id", "schools", "id")
                        .on_delete(ReferentialAction::Cascade),
                ),
        )
        .unwrap()
}

#[test]
fn test_tenant_fk_targets_cloned_copy_and_global_fk_stays_global() {
    let tenant_x = NamespaceName::new("tenant_x").unwrap();
    let cloned = SchemaCloner::new(school_schema()).clone_into(&tenant_x).unwrap();

    // courses -> schools is rewritten to the copy in tenant_x
    let courses = cloned.table("courses").unwrap();
    assert_eq!(courses.foreign_keys()[0].target, QualifiedTable::new(tenant_x.clone(), "schools"));

    // schools -> global_users still points at public
    let schools = cloned.table("schools").unwrap();
    assert_eq!(
        schools.foreign_keys()[0].target,
        QualifiedTable::new(NamespaceName::global(), "global_users")
    );

    let names: Vec<_> = cloned.tables().iter().map(|t| t.name()).collect();
    assert_eq!(names, ["schools", "courses"]);
    assert_eq!(cloned.global_tables().len(), 2);
}

#[test]
fn test_every_cloned_table_renders_into_its_namespace() {
    let cloned = SchemaCloner::new(school_schema())
        .clone_into(&NamespaceName::new("acme").unwrap())
        .unwrap();

    let plan = cloned.creation_plan();
    assert!(plan.deferred.is_empty());
    for table in plan.tables {
        let sql = table.create_sql();
        assert!(sql.contains(&format!(r#""acme"."{}""#, table.name())), "{sql}");
        assert!(!sql.contains(r#""public"."schools""#), "{sql}");
    }

    let courses = cloned.table("courses").unwrap();
    assert_eq!(courses.index_sql().len(), 1);
}

#[test]
fn test_dangling_reference_fails_the_whole_clone() {
    let schema = school_schema()
        .with_table(
            TableDefinition::tenant("grades")
                .with_column(ColumnDefinition::new("id", ColumnType::Uuid))
                .with_column(ColumnDefinition::new("enrollment_id", ColumnType::Uuid))
                .with_foreign_key(ForeignKeyDefinition::new("enrollment_id", "enrollments", "id")),
        )
        .unwrap();

    let result = SchemaCloner::new(schema).clone_into(&NamespaceName::new("acme").unwrap());

    assert!(matches!(
        result,
        Err(SchemaError::DanglingForeignKey { ref table, ref target })
            if table == "grades" && target == "enrollments"
    ));
}

#[test]
fn test_global_tables_bind_to_public() {
    let tables = SchemaCloner::new(school_schema()).bind_global().unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name()).collect();

    assert_eq!(names, ["tenants", "global_users"]);
    assert!(tables[0].create_sql().contains(r#""public"."tenants""#));
}
