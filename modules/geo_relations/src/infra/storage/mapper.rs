//! Query result rows and their conversions to contract models

use crate::contract::{EntityType, Geometry, RouteStatus, SpatialEntity};
use sea_orm::FromQueryResult;

/// `id`, EWKT geometry and partition key of any entity table
#[derive(Debug, FromQueryResult)]
pub struct EntityRow {
    pub id: i64,
    pub geometry: Option<String>,
    pub partition_key: Option<i64>,
}

impl EntityRow {
    pub fn into_entity(self, entity_type: EntityType) -> SpatialEntity {
        SpatialEntity {
            id: self.id,
            entity_type,
            geometry: self.geometry.map(Geometry::from_ewkt),
            partition_key: self.partition_key,
        }
    }
}

#[derive(Debug, FromQueryResult)]
pub struct IdRow {
    pub id: i64,
}

#[derive(Debug, FromQueryResult)]
pub struct MeasureRow {
    pub covered: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, FromQueryResult)]
pub struct IdArrayRow {
    pub ids: Option<serde_json::Value>,
}

/// Status columns of a hiking route, cast to portable types in SQL
#[derive(Debug, FromQueryResult)]
pub struct RouteStatusRow {
    pub id: i64,
    pub osm2cai_status: Option<i32>,
    pub validation_date: Option<String>,
    pub issues_status: Option<String>,
    pub issues_last_update: Option<String>,
    pub issues_user_id: Option<i64>,
    pub issues_chronology: Option<serde_json::Value>,
    pub issues_description: Option<String>,
    pub description_cai_it: Option<String>,
}

impl From<RouteStatusRow> for (i64, RouteStatus) {
    fn from(row: RouteStatusRow) -> Self {
        (
            row.id,
            RouteStatus {
                status: row.osm2cai_status,
                validation_date: row.validation_date,
                issues_status: row.issues_status,
                issues_last_update: row.issues_last_update,
                issues_user_id: row.issues_user_id,
                issues_chronology: row.issues_chronology,
                issues_description: row.issues_description,
                description: row.description_cai_it,
            },
        )
    }
}

/// Decode a stored id array; `null` and non-arrays read as absent
pub fn ids_from_json(value: Option<serde_json::Value>) -> anyhow::Result<Option<Vec<i64>>> {
    match value {
        Some(value @ serde_json::Value::Array(_)) => Ok(Some(serde_json::from_value(value)?)),
        _ => Ok(None),
    }
}
