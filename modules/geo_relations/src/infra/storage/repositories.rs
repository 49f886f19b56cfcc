//! SeaORM repository implementations over PostGIS
//!
//! Spatial predicates and measurements run as raw SQL; pivot writes are built
//! with sea-query because table and column names come from the registry.

use super::entity::region;
use super::mapper::{ids_from_json, EntityRow, IdArrayRow, IdRow, MeasureRow, RouteStatusRow};
use crate::contract::{Geometry, IntersectionEdge, ProximityEdge, RouteStatus, SpatialEntity};
use crate::domain::registry::{EntityDescriptor, PivotDescriptor};
use crate::domain::repository::{
    GeometryRepository, Operand, OverlapMeasure, OverlapMethod, RelationRepository,
    SnapshotRepository,
};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, OnConflict, Query, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult,
    QueryFilter, Statement, TransactionTrait, Value,
};
use std::sync::Arc;

/// Double-quoted SQL identifier
fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn partition_expr(entity: &EntityDescriptor) -> String {
    match &entity.partition_column {
        Some(column) => format!("t.{}::bigint", ident(column)),
        None => "NULL::bigint".to_string(),
    }
}

fn stmt(sql: String, values: Vec<Value>) -> Statement {
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

// ===== Geometry Repository =====

pub struct SeaOrmGeometryRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmGeometryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GeometryRepository for SeaOrmGeometryRepository {
    async fn find_entity(&self, entity: &EntityDescriptor, id: i64) -> Result<Option<SpatialEntity>> {
        let sql = format!(
            "SELECT t.id::bigint AS id, ST_AsEWKT(t.{geom}) AS geometry, {part} AS partition_key \
             FROM {table} t WHERE t.id = $1",
            geom = ident(&entity.geometry_column),
            part = partition_expr(entity),
            table = ident(&entity.table),
        );
        let row = EntityRow::find_by_statement(stmt(sql, vec![id.into()]))
            .one(&*self.db)
            .await?;
        Ok(row.map(|r| r.into_entity(entity.entity_type)))
    }

    async fn intersecting(
        &self,
        geometry: &Geometry,
        target: &EntityDescriptor,
    ) -> Result<Vec<SpatialEntity>> {
        let sql = format!(
            "SELECT t.id::bigint AS id, ST_AsEWKT(t.{geom}) AS geometry, {part} AS partition_key \
             FROM {table} t \
             WHERE t.{geom} IS NOT NULL AND ST_Intersects(t.{geom}, ST_GeomFromEWKT($1)) \
             ORDER BY t.id",
            geom = ident(&target.geometry_column),
            part = partition_expr(target),
            table = ident(&target.table),
        );
        let rows = EntityRow::find_by_statement(stmt(sql, vec![geometry.as_ewkt().into()]))
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_entity(target.entity_type))
            .collect())
    }

    async fn within_distance(
        &self,
        geometry: &Geometry,
        target: &EntityDescriptor,
        buffer_meters: i64,
        partition: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<Vec<i64>> {
        let geom = ident(&target.geometry_column);
        let mut sql = format!(
            "SELECT t.id::bigint AS id FROM {table} t \
             WHERE t.{geom} IS NOT NULL \
             AND ST_DWithin(t.{geom}::geography, ST_GeomFromEWKT($1)::geography, $2)",
            table = ident(&target.table),
        );
        let mut values: Vec<Value> = vec![geometry.as_ewkt().into(), (buffer_meters as f64).into()];

        if let (Some(column), Some(key)) = (&target.partition_column, partition) {
            values.push(key.into());
            sql.push_str(&format!(" AND t.{} = ${}", ident(column), values.len()));
        }
        if let Some(id) = exclude_id {
            values.push(id.into());
            sql.push_str(&format!(" AND t.id <> ${}", values.len()));
        }
        sql.push_str(" ORDER BY t.id");

        let rows = IdRow::find_by_statement(stmt(sql, values))
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn measure_overlap(
        &self,
        base: &Geometry,
        target: &Geometry,
        method: OverlapMethod,
    ) -> Result<OverlapMeasure> {
        let mut values: Vec<Value> = vec![base.as_ewkt().into(), target.as_ewkt().into()];
        let operand = |reference: Operand| match reference {
            Operand::Base => "g.a",
            Operand::Target => "g.b",
        };
        let select = match method {
            OverlapMethod::SpheroidLength { reference } => {
                let reference = operand(reference);
                format!(
                    "ST_Length(ST_Intersection(g.a, g.b)::geography, true) AS covered, \
                     ST_Length({reference}::geography, true) AS total"
                )
            }
            OverlapMethod::ProjectedArea { srid, reference } => {
                values.push(srid.into());
                format!(
                    "ST_Area(ST_Intersection(ST_Transform(g.a, $3), ST_Transform(g.b, $3))) AS covered, \
                     ST_Area(ST_Transform({reference}, $3)) AS total",
                    reference = operand(reference)
                )
            }
        };
        let sql = format!(
            "SELECT {select} FROM (SELECT ST_GeomFromEWKT($1) AS a, ST_GeomFromEWKT($2) AS b) g"
        );

        let row = MeasureRow::find_by_statement(stmt(sql, values))
            .one(&*self.db)
            .await?;
        let (covered, total) = row
            .map(|r| (r.covered.unwrap_or(0.0), r.total.unwrap_or(0.0)))
            .unwrap_or((0.0, 0.0));
        Ok(OverlapMeasure { covered, total })
    }

    async fn list_ids(&self, entity: &EntityDescriptor) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT t.id::bigint AS id FROM {table} t ORDER BY t.id",
            table = ident(&entity.table)
        );
        let rows = IdRow::find_by_statement(stmt(sql, Vec::new()))
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }
}

// ===== Relation Repository =====

pub struct SeaOrmRelationRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmRelationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RelationRepository for SeaOrmRelationRepository {
    async fn replace_edges(
        &self,
        pivot: &PivotDescriptor,
        base_id: i64,
        edges: &[IntersectionEdge],
    ) -> Result<()> {
        let table = Alias::new(pivot.table.as_str());
        let base_key = Alias::new(pivot.foreign_key_a.as_str());

        let delete = Query::delete()
            .from_table(table.clone())
            .and_where(Expr::col(base_key.clone()).eq(base_id))
            .to_owned();

        let txn = self.db.begin().await?;
        txn.execute(DbBackend::Postgres.build(&delete)).await?;

        if !edges.is_empty() {
            let mut columns = vec![base_key, Alias::new(pivot.foreign_key_b.as_str())];
            if pivot.has_percentage {
                columns.push(Alias::new("percentage"));
            }
            columns.push(Alias::new("created_at"));
            columns.push(Alias::new("updated_at"));

            let mut insert = Query::insert();
            insert.into_table(table).columns(columns);
            for edge in edges {
                let mut row: Vec<SimpleExpr> = vec![edge.base_id.into(), edge.target_id.into()];
                if pivot.has_percentage {
                    row.push(edge.percentage.into());
                }
                row.push(edge.created_at.into());
                row.push(edge.updated_at.into());
                insert.values(row)?;
            }
            txn.execute(DbBackend::Postgres.build(&insert)).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn attach_edges(
        &self,
        pivot: &PivotDescriptor,
        _base_id: i64,
        edges: &[ProximityEdge],
    ) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let base_key = Alias::new(pivot.foreign_key_a.as_str());
        let target_key = Alias::new(pivot.foreign_key_b.as_str());

        let mut insert = Query::insert();
        insert.into_table(Alias::new(pivot.table.as_str())).columns([
            base_key.clone(),
            target_key.clone(),
            Alias::new("buffer"),
            Alias::new("created_at"),
            Alias::new("updated_at"),
        ]);
        for edge in edges {
            insert.values([
                edge.base_id.into(),
                edge.target_id.into(),
                edge.buffer_meters.into(),
                edge.created_at.into(),
                edge.updated_at.into(),
            ])?;
        }
        insert.on_conflict(
            OnConflict::columns([base_key, target_key])
                .update_columns([Alias::new("buffer"), Alias::new("updated_at")])
                .to_owned(),
        );

        self.db.execute(DbBackend::Postgres.build(&insert)).await?;
        Ok(())
    }

    async fn read_id_array(
        &self,
        entity: &EntityDescriptor,
        column: &str,
        id: i64,
    ) -> Result<Option<Vec<i64>>> {
        let sql = format!(
            "SELECT t.{column}::jsonb AS ids FROM {table} t WHERE t.id = $1",
            column = ident(column),
            table = ident(&entity.table),
        );
        let row = IdArrayRow::find_by_statement(stmt(sql, vec![id.into()]))
            .one(&*self.db)
            .await?;
        ids_from_json(row.and_then(|r| r.ids))
    }

    async fn write_id_array(
        &self,
        entity: &EntityDescriptor,
        column: &str,
        id: i64,
        ids: &[i64],
    ) -> Result<()> {
        let update = Query::update()
            .table(Alias::new(entity.table.as_str()))
            .value(Alias::new(column), serde_json::json!(ids))
            .and_where(Expr::col(Alias::new("id")).eq(id))
            .to_owned();
        self.db.execute(DbBackend::Postgres.build(&update)).await?;
        Ok(())
    }
}

// ===== Snapshot Repository =====

pub struct SeaOrmSnapshotRepository {
    db: Arc<DatabaseConnection>,
    routes: EntityDescriptor,
}

impl SeaOrmSnapshotRepository {
    /// `routes` names the hiking route table the status columns are read from
    pub fn new(db: Arc<DatabaseConnection>, routes: EntityDescriptor) -> Self {
        Self { db, routes }
    }
}

#[async_trait]
impl SnapshotRepository for SeaOrmSnapshotRepository {
    async fn route_statuses_within(&self, geometry: &Geometry) -> Result<Vec<(i64, RouteStatus)>> {
        let sql = format!(
            "SELECT t.id::bigint AS id, \
                    t.osm2cai_status::int AS osm2cai_status, \
                    t.validation_date::text AS validation_date, \
                    t.issues_status::text AS issues_status, \
                    t.issues_last_update::text AS issues_last_update, \
                    t.issues_user_id::bigint AS issues_user_id, \
                    t.issues_chronology::jsonb AS issues_chronology, \
                    t.issues_description::text AS issues_description, \
                    t.description_cai_it::text AS description_cai_it \
             FROM {table} t \
             WHERE t.{geom} IS NOT NULL AND ST_Intersects(t.{geom}, ST_GeomFromEWKT($1)) \
             ORDER BY t.id",
            table = ident(&self.routes.table),
            geom = ident(&self.routes.geometry_column),
        );
        let rows = RouteStatusRow::find_by_statement(stmt(sql, vec![geometry.as_ewkt().into()]))
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn write_region_snapshot(&self, region_id: i64, document: serde_json::Value) -> Result<()> {
        region::Entity::update_many()
            .col_expr(region::Column::HikingRoutesIntersecting, Expr::value(document))
            .filter(region::Column::Id.eq(region_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}
