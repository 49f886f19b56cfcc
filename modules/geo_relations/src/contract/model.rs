//! Contract models for the geo relations module
//!
//! These models are transport-agnostic and used for inter-module communication.
//! Only the types that cross the job queue or end up in JSON columns carry serde
//! derives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Catalogue entity types taking part in derived spatial relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    HikingRoute,
    Region,
    Province,
    Area,
    Sector,
    MountainGroup,
    CaiHut,
    EcPoi,
    NaturalSpring,
    Club,
    Pole,
}

impl EntityType {
    /// Every member of the closed enumeration
    pub const ALL: [EntityType; 11] = [
        EntityType::HikingRoute,
        EntityType::Region,
        EntityType::Province,
        EntityType::Area,
        EntityType::Sector,
        EntityType::MountainGroup,
        EntityType::CaiHut,
        EntityType::EcPoi,
        EntityType::NaturalSpring,
        EntityType::Club,
        EntityType::Pole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::HikingRoute => "hiking_route",
            EntityType::Region => "region",
            EntityType::Province => "province",
            EntityType::Area => "area",
            EntityType::Sector => "sector",
            EntityType::MountainGroup => "mountain_group",
            EntityType::CaiHut => "cai_hut",
            EntityType::EcPoi => "ec_poi",
            EntityType::NaturalSpring => "natural_spring",
            EntityType::Club => "club",
            EntityType::Pole => "pole",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape class of an entity type's geometry column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Line,
    Polygon,
    Point,
}

/// Geometry value in extended WKT (`SRID=4326;LINESTRING(...)`)
///
/// The value is opaque to the engines: every predicate and measurement is
/// evaluated by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry(String);

impl Geometry {
    pub fn from_ewkt(ewkt: impl Into<String>) -> Self {
        Self(ewkt.into())
    }

    /// Geographic (EPSG:4326) geometry from plain WKT
    pub fn wgs84(wkt: &str) -> Self {
        Self(format!("SRID=4326;{wkt}"))
    }

    pub fn as_ewkt(&self) -> &str {
        &self.0
    }
}

/// Capability shared by every entity that owns a geometry column
///
/// The sync engines only ever see entities through this trait.
pub trait HasGeometry: Send + Sync {
    fn id(&self) -> i64;

    fn entity_type(&self) -> EntityType;

    fn geometry(&self) -> Option<&Geometry>;

    /// Tenant / application partition the entity belongs to
    fn partition_key(&self) -> Option<i64> {
        None
    }
}

/// Generic row of any entity table, as re-fetched inside a worker
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntity {
    pub id: i64,
    pub entity_type: EntityType,
    pub geometry: Option<Geometry>,
    pub partition_key: Option<i64>,
}

impl SpatialEntity {
    pub fn new(entity_type: EntityType, id: i64, geometry: Option<Geometry>) -> Self {
        Self {
            id,
            entity_type,
            geometry,
            partition_key: None,
        }
    }

    pub fn with_partition(mut self, partition_key: i64) -> Self {
        self.partition_key = Some(partition_key);
        self
    }
}

impl HasGeometry for SpatialEntity {
    fn id(&self) -> i64 {
        self.id
    }

    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn partition_key(&self) -> Option<i64> {
        self.partition_key
    }
}

/// Pivot row materializing one intersecting pair
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionEdge {
    pub base_id: i64,
    pub target_id: i64,
    /// Overlap percentage in [0, 100], present when the pivot has the column
    pub percentage: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pivot row materializing one "nearby" pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityEdge {
    pub base_id: i64,
    pub target_id: i64,
    pub buffer_meters: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable status fields of a hiking route, as kept in a region snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStatus {
    #[serde(rename = "osm2cai_status")]
    pub status: Option<i32>,
    pub validation_date: Option<String>,
    pub issues_status: Option<String>,
    pub issues_last_update: Option<String>,
    pub issues_user_id: Option<i64>,
    pub issues_chronology: Option<serde_json::Value>,
    pub issues_description: Option<String>,
    #[serde(rename = "description_cai_it")]
    pub description: Option<String>,
}

/// Snapshot document stored on a region row: hiking route id → status fields
pub type RegionSnapshot = BTreeMap<i64, RouteStatus>;

/// Which regions a snapshot refresh covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SnapshotScope {
    Region(i64),
    HikingRoute(i64),
    AllRegions,
}

/// Payload of a sync request coming from a geometry mutation hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueRequest {
    pub base_type: EntityType,
    pub base_id: i64,
    pub target_type: EntityType,
    /// Present for proximity units, absent for intersection units
    pub buffer_meters: Option<i64>,
}

/// Emitted by the host application whenever an entity's geometry changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryChanged {
    pub entity_type: EntityType,
    pub entity_id: i64,
}
