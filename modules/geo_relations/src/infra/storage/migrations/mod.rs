//! Database migrations for geo relations
//!
//! Entity tables belong to the catalogue; these migrations only create the
//! pivot tables and the denormalized columns this module writes.

use crate::config::default_proximity_rules;
use crate::contract::EntityType;
use crate::domain::proximity::ProximityStrategy;
use crate::domain::registry::{EntityRegistry, PivotDescriptor};
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_pivots::Migration),
            Box::new(m20250301_000002_add_derived_columns::Migration),
        ]
    }
}

mod m20250301_000001_create_pivots {
    use super::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    pub(super) fn create_pivot(registry: &EntityRegistry, pivot: &PivotDescriptor) -> Result<TableCreateStatement, DbErr> {
        let table_of = |t| {
            registry
                .descriptor(t)
                .map(|d| d.table.clone())
                .map_err(|e| DbErr::Migration(e.to_string()))
        };
        let table_a = table_of(pivot.type_a)?;
        let table_b = table_of(pivot.type_b)?;

        let mut create = Table::create();
        create
            .table(Alias::new(pivot.table.as_str()))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new(pivot.foreign_key_a.as_str())).big_integer().not_null())
            .col(ColumnDef::new(Alias::new(pivot.foreign_key_b.as_str())).big_integer().not_null());
        if pivot.has_percentage {
            create.col(ColumnDef::new(Alias::new("percentage")).double());
        }
        if pivot.has_buffer {
            create.col(ColumnDef::new(Alias::new("buffer")).big_integer().not_null());
        }
        create
            .col(
                ColumnDef::new(Alias::new("created_at"))
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Alias::new("updated_at"))
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .primary_key(
                Index::create()
                    .col(Alias::new(pivot.foreign_key_a.as_str()))
                    .col(Alias::new(pivot.foreign_key_b.as_str())),
            );

        for (key, table) in [(&pivot.foreign_key_a, table_a), (&pivot.foreign_key_b, table_b)] {
            create.foreign_key(
                ForeignKey::create()
                    .name(format!("fk_{}_{}", pivot.table, key))
                    .from(Alias::new(pivot.table.as_str()), Alias::new(key.as_str()))
                    .to(Alias::new(table.as_str()), Alias::new("id"))
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::Cascade),
            );
        }
        Ok(create.to_owned())
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let registry = EntityRegistry::builtin();
            for pivot in registry.pivots() {
                manager.create_table(create_pivot(&registry, pivot)?).await?;

                // Lookups from the second side
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(format!("idx_{}_{}", pivot.table, pivot.foreign_key_b))
                            .table(Alias::new(pivot.table.as_str()))
                            .col(Alias::new(pivot.foreign_key_b.as_str()))
                            .to_owned(),
                    )
                    .await?;
            }
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for pivot in EntityRegistry::builtin().pivots() {
                manager
                    .drop_table(
                        Table::drop()
                            .table(Alias::new(pivot.table.as_str()))
                            .if_exists()
                            .to_owned(),
                    )
                    .await?;
            }
            Ok(())
        }
    }
}

mod m20250301_000002_add_derived_columns {
    use super::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    /// `(table, column)` for every id array and the region snapshot document
    fn derived_columns() -> Result<Vec<(String, String)>, DbErr> {
        let registry = EntityRegistry::builtin();
        let mut columns = Vec::new();
        for rule in default_proximity_rules() {
            if let ProximityStrategy::ReplaceArray { column } = rule.strategy {
                let table = registry
                    .descriptor(rule.base)
                    .map_err(|e| DbErr::Migration(e.to_string()))?
                    .table
                    .clone();
                columns.push((table, column));
            }
        }
        let regions = registry
            .descriptor(EntityType::Region)
            .map_err(|e| DbErr::Migration(e.to_string()))?;
        columns.push((regions.table.clone(), "hiking_routes_intersecting".to_string()));
        Ok(columns)
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for (table, column) in derived_columns()? {
                manager
                    .alter_table(
                        Table::alter()
                            .table(Alias::new(table.as_str()))
                            .add_column_if_not_exists(ColumnDef::new(Alias::new(column.as_str())).json_binary())
                            .to_owned(),
                    )
                    .await?;
            }
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for (table, column) in derived_columns()? {
                manager
                    .alter_table(
                        Table::alter()
                            .table(Alias::new(table.as_str()))
                            .drop_column(Alias::new(column.as_str()))
                            .to_owned(),
                    )
                    .await?;
            }
            Ok(())
        }
    }
}
