//! Repository traits for data access
//!
//! These traits define the interface to the geometry store. Every spatial
//! predicate and measurement is evaluated by the store; implementations are in
//! infra/storage/repositories.rs

use super::registry::{EntityDescriptor, PivotDescriptor};
use crate::contract::{Geometry, IntersectionEdge, ProximityEdge, RouteStatus, SpatialEntity};
use anyhow::Result;
use async_trait::async_trait;

/// Which operand of an overlap measurement is the reference geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Base,
    Target,
}

/// How the store should measure an overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMethod {
    /// Spheroidal length of the intersection against the length of `reference`
    SpheroidLength { reference: Operand },
    /// Area of the intersection against the area of `reference`, both projected into `srid`
    ProjectedArea { srid: i32, reference: Operand },
}

/// Raw measurements backing an overlap percentage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapMeasure {
    /// Length or area of the intersection
    pub covered: f64,
    /// Length or area of the reference geometry
    pub total: f64,
}

/// Spatial queries over entity tables
#[async_trait]
pub trait GeometryRepository: Send + Sync {
    /// Re-fetch one entity with its geometry and partition key
    async fn find_entity(&self, entity: &EntityDescriptor, id: i64) -> Result<Option<SpatialEntity>>;

    /// All rows of `target` whose geometry topologically intersects `geometry`
    async fn intersecting(
        &self,
        geometry: &Geometry,
        target: &EntityDescriptor,
    ) -> Result<Vec<SpatialEntity>>;

    /// Ids of `target` rows within `buffer_meters` of `geometry`, on geography casts
    async fn within_distance(
        &self,
        geometry: &Geometry,
        target: &EntityDescriptor,
        buffer_meters: i64,
        partition: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<Vec<i64>>;

    async fn measure_overlap(
        &self,
        base: &Geometry,
        target: &Geometry,
        method: OverlapMethod,
    ) -> Result<OverlapMeasure>;

    /// Every id of an entity table, ascending
    async fn list_ids(&self, entity: &EntityDescriptor) -> Result<Vec<i64>>;
}

/// Writes of derived relationships
#[async_trait]
pub trait RelationRepository: Send + Sync {
    /// Delete every row keyed by `base_id` on `pivot.foreign_key_a` and insert
    /// `edges`, atomically with respect to readers
    async fn replace_edges(
        &self,
        pivot: &PivotDescriptor,
        base_id: i64,
        edges: &[IntersectionEdge],
    ) -> Result<()>;

    /// Insert or refresh `edges` without detaching anything else
    async fn attach_edges(
        &self,
        pivot: &PivotDescriptor,
        base_id: i64,
        edges: &[ProximityEdge],
    ) -> Result<()>;

    /// JSON id array stored in `column` of the entity row, if any
    async fn read_id_array(
        &self,
        entity: &EntityDescriptor,
        column: &str,
        id: i64,
    ) -> Result<Option<Vec<i64>>>;

    async fn write_id_array(
        &self,
        entity: &EntityDescriptor,
        column: &str,
        id: i64,
        ids: &[i64],
    ) -> Result<()>;
}

/// Region snapshot reads and writes
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Status fields of every hiking route intersecting `geometry`
    async fn route_statuses_within(&self, geometry: &Geometry) -> Result<Vec<(i64, RouteStatus)>>;

    /// Overwrite the snapshot document of one region
    async fn write_region_snapshot(&self, region_id: i64, document: serde_json::Value) -> Result<()>;
}
