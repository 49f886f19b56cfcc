//! Entity type registry and pivot resolver
//!
//! Classifies every entity type by geometry shape, names its table, and maps
//! unordered pairs of entity types to the join table materializing their
//! relationship. The registry is a plain value passed into the engines so
//! deployments and tests can swap mappings without touching engine code.

use crate::contract::{EntityType, GeometryKind, GeoSyncError};
use std::collections::HashMap;

/// Where an entity type lives in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    pub kind: GeometryKind,
    /// Concrete table name, e.g. `hiking_routes`
    pub table: String,
    /// Singular table name used for foreign keys, e.g. `hiking_route`
    pub singular: String,
    pub geometry_column: String,
    /// Tenant / application partition column, when the table is partitioned
    pub partition_column: Option<String>,
}

impl EntityDescriptor {
    pub fn new(entity_type: EntityType, kind: GeometryKind, table: &str, singular: &str) -> Self {
        Self {
            entity_type,
            kind,
            table: table.to_string(),
            singular: singular.to_string(),
            geometry_column: "geometry".to_string(),
            partition_column: None,
        }
    }

    pub fn partitioned_by(mut self, column: &str) -> Self {
        self.partition_column = Some(column.to_string());
        self
    }

    /// `<singular-table-name>_id`
    pub fn foreign_key(&self) -> String {
        format!("{}_id", self.singular)
    }
}

/// Join table between two entity types, oriented as `type_a` → `type_b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotDescriptor {
    pub type_a: EntityType,
    pub type_b: EntityType,
    pub table: String,
    pub foreign_key_a: String,
    pub foreign_key_b: String,
    /// Carries an overlap `percentage` column
    pub has_percentage: bool,
    /// Carries a `buffer` column (proximity pivot)
    pub has_buffer: bool,
    /// Seen from the side it was registered against; `type_a` is then the
    /// second registered type
    pub reversed: bool,
}

impl PivotDescriptor {
    /// Same table seen from the other side
    pub fn flipped(&self) -> Self {
        Self {
            type_a: self.type_b,
            type_b: self.type_a,
            table: self.table.clone(),
            foreign_key_a: self.foreign_key_b.clone(),
            foreign_key_b: self.foreign_key_a.clone(),
            has_percentage: self.has_percentage,
            has_buffer: self.has_buffer,
            reversed: !self.reversed,
        }
    }

    pub fn connects(&self, a: EntityType, b: EntityType) -> bool {
        (self.type_a == a && self.type_b == b) || (self.type_a == b && self.type_b == a)
    }
}

/// Entity descriptors plus the pivot lookup table
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityType, EntityDescriptor>,
    pivots: Vec<PivotDescriptor>,
}

impl EntityRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalogue tables and pivots of the production schema
    pub fn builtin() -> Self {
        use EntityType::*;
        use GeometryKind::*;

        Self::empty()
            .with_entity(EntityDescriptor::new(HikingRoute, Line, "hiking_routes", "hiking_route"))
            .with_entity(EntityDescriptor::new(Region, Polygon, "regions", "region"))
            .with_entity(EntityDescriptor::new(Province, Polygon, "provinces", "province"))
            .with_entity(EntityDescriptor::new(Area, Polygon, "areas", "area"))
            .with_entity(EntityDescriptor::new(Sector, Polygon, "sectors", "sector"))
            .with_entity(EntityDescriptor::new(MountainGroup, Polygon, "mountain_groups", "mountain_group"))
            .with_entity(EntityDescriptor::new(CaiHut, Point, "cai_huts", "cai_hut"))
            .with_entity(EntityDescriptor::new(EcPoi, Point, "ec_pois", "ec_poi").partitioned_by("app_id"))
            .with_entity(EntityDescriptor::new(NaturalSpring, Point, "natural_springs", "natural_spring"))
            .with_entity(EntityDescriptor::new(Club, Point, "clubs", "club"))
            .with_entity(EntityDescriptor::new(Pole, Point, "poles", "pole"))
            .with_pivot(HikingRoute, Region, "hiking_route_region", true)
            .with_pivot(HikingRoute, Province, "hiking_route_province", true)
            .with_pivot(HikingRoute, Sector, "hiking_route_sector", true)
            .with_pivot(Area, HikingRoute, "area_hiking_route", true)
            .with_pivot(MountainGroup, HikingRoute, "mountain_groups_hiking_routes", true)
            .with_pivot(MountainGroup, Region, "mountain_groups_region", true)
            .with_pivot(MountainGroup, CaiHut, "mountain_groups_cai_huts", false)
            .with_pivot(MountainGroup, EcPoi, "mountain_groups_ec_pois", false)
            .with_pivot(MountainGroup, Club, "mountain_groups_clubs", false)
            .with_proximity_pivot(EcPoi, HikingRoute, "ec_poi_hiking_route")
    }

    pub fn with_entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.insert(descriptor.entity_type, descriptor);
        self
    }

    /// Register an intersection pivot; foreign keys derive from the singular names
    pub fn with_pivot(self, a: EntityType, b: EntityType, table: &str, has_percentage: bool) -> Self {
        self.push_pivot(a, b, table, has_percentage, false)
    }

    /// Register a proximity pivot carrying a `buffer` column
    pub fn with_proximity_pivot(self, a: EntityType, b: EntityType, table: &str) -> Self {
        self.push_pivot(a, b, table, false, true)
    }

    fn push_pivot(
        mut self,
        a: EntityType,
        b: EntityType,
        table: &str,
        has_percentage: bool,
        has_buffer: bool,
    ) -> Self {
        let key_for = |t: EntityType| {
            self.entities
                .get(&t)
                .map(EntityDescriptor::foreign_key)
                .unwrap_or_else(|| format!("{}_id", t.as_str()))
        };
        let descriptor = PivotDescriptor {
            type_a: a,
            type_b: b,
            table: table.to_string(),
            foreign_key_a: key_for(a),
            foreign_key_b: key_for(b),
            has_percentage,
            has_buffer,
            reversed: false,
        };
        self.pivots.retain(|p| !p.connects(a, b));
        self.pivots.push(descriptor);
        self
    }

    pub fn descriptor(&self, entity_type: EntityType) -> Result<&EntityDescriptor, GeoSyncError> {
        self.entities
            .get(&entity_type)
            .ok_or(GeoSyncError::UnknownEntityType(entity_type))
    }

    pub fn kind(&self, entity_type: EntityType) -> Option<GeometryKind> {
        self.entities.get(&entity_type).map(|d| d.kind)
    }

    /// Resolve the join table for a pair, oriented so `type_a == a`
    pub fn resolve_table(&self, a: EntityType, b: EntityType) -> Result<PivotDescriptor, GeoSyncError> {
        self.pivots
            .iter()
            .find(|p| p.connects(a, b))
            .map(|p| if p.type_a == a { p.clone() } else { p.flipped() })
            .ok_or(GeoSyncError::UnresolvedPairing { a, b })
    }

    pub fn pivots(&self) -> &[PivotDescriptor] {
        &self.pivots
    }

    /// Targets reachable from `entity_type` through an intersection pivot
    pub fn intersection_targets(&self, entity_type: EntityType) -> Vec<EntityType> {
        let mut targets: Vec<EntityType> = self
            .pivots
            .iter()
            .filter(|p| !p.has_buffer)
            .filter_map(|p| {
                if p.type_a == entity_type {
                    Some(p.type_b)
                } else if p.type_b == entity_type {
                    Some(p.type_a)
                } else {
                    None
                }
            })
            .collect();
        targets.sort();
        targets
    }
}
