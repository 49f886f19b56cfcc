//! Shared in-memory store and test helpers
//!
//! `MockStore` implements every repository trait over plain maps. Geometry is
//! evaluated with a tiny planar model: points, line strings, and polygons
//! reduced to their bounding rectangle. Distances use haversine metres, line
//! lengths are summed haversine segment lengths, areas are in square degrees.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_relations::contract::{
    EntityType, Geometry, IntersectionEdge, ProximityEdge, RouteStatus, SpatialEntity,
};
use geo_relations::domain::registry::{EntityDescriptor, PivotDescriptor};
use geo_relations::domain::repository::{
    GeometryRepository, Operand, OverlapMeasure, OverlapMethod, RelationRepository,
    SnapshotRepository,
};
use geo_relations::domain::Repositories;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ===== Geometry builders =====

pub fn point(lon: f64, lat: f64) -> Geometry {
    Geometry::wgs84(&format!("POINT({lon} {lat})"))
}

pub fn line(coords: &[(f64, f64)]) -> Geometry {
    let body: Vec<String> = coords.iter().map(|(x, y)| format!("{x} {y}")).collect();
    Geometry::wgs84(&format!("LINESTRING({})", body.join(", ")))
}

pub fn rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Geometry {
    Geometry::wgs84(&format!(
        "POLYGON(({min_lon} {min_lat}, {max_lon} {min_lat}, {max_lon} {max_lat}, {min_lon} {max_lat}, {min_lon} {min_lat}))"
    ))
}

// ===== Planar model =====

type P = (f64, f64);

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone)]
enum Shape {
    Point(P),
    Line(Vec<P>),
    Rect { min: P, max: P },
}

fn parse(geometry: &Geometry) -> Shape {
    let text = geometry.as_ewkt();
    let wkt = text.split_once(';').map(|(_, w)| w).unwrap_or(text);
    let (kind, rest) = wkt.split_once('(').expect("WKT without coordinates");
    let coords: Vec<P> = rest
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(|pair| {
            let mut it = pair.split_whitespace().map(|v| v.parse::<f64>().expect("bad coordinate"));
            (it.next().expect("missing x"), it.next().expect("missing y"))
        })
        .collect();
    match kind.trim() {
        "POINT" => Shape::Point(coords[0]),
        "LINESTRING" => Shape::Line(coords),
        "POLYGON" => {
            let min = coords.iter().fold((f64::MAX, f64::MAX), |m, c| (m.0.min(c.0), m.1.min(c.1)));
            let max = coords.iter().fold((f64::MIN, f64::MIN), |m, c| (m.0.max(c.0), m.1.max(c.1)));
            Shape::Rect { min, max }
        }
        other => panic!("unsupported geometry {other}"),
    }
}

fn haversine(a: P, b: P) -> f64 {
    let (lat1, lat2) = (a.1.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.0 - a.0).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn segments(shape: &Shape) -> Vec<(P, P)> {
    match shape {
        Shape::Point(p) => vec![(*p, *p)],
        Shape::Line(coords) if coords.len() == 1 => vec![(coords[0], coords[0])],
        Shape::Line(coords) => coords.windows(2).map(|w| (w[0], w[1])).collect(),
        Shape::Rect { min, max } => {
            let corners = [*min, (max.0, min.1), *max, (min.0, max.1)];
            (0..4).map(|i| (corners[i], corners[(i + 1) % 4])).collect()
        }
    }
}

/// Liang-Barsky clip of a segment against a rectangle
fn clip(a: P, b: P, min: P, max: P) -> Option<(P, P)> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [(-dx, a.0 - min.0), (dx, max.0 - a.0), (-dy, a.1 - min.1), (dy, max.1 - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }
    Some(((a.0 + t0 * dx, a.1 + t0 * dy), (a.0 + t1 * dx, a.1 + t1 * dy)))
}

/// Metres from `p` to the segment `a`-`b`, via a local equirectangular frame
fn point_segment_m(p: P, a: P, b: P) -> f64 {
    let k = p.1.to_radians().cos();
    let (ax, ay) = ((a.0 - p.0) * k, a.1 - p.1);
    let (bx, by) = ((b.0 - p.0) * k, b.1 - p.1);
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    haversine(p, (p.0 + cx / k, p.1 + cy))
}

fn orientation(a: P, b: P, c: P) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn segments_cross(a: (P, P), b: (P, P)) -> bool {
    let d1 = orientation(b.0, b.1, a.0);
    let d2 = orientation(b.0, b.1, a.1);
    let d3 = orientation(a.0, a.1, b.0);
    let d4 = orientation(a.0, a.1, b.1);
    (d1 * d2 <= 0.0) && (d3 * d4 <= 0.0) && !(d1 == 0.0 && d2 == 0.0 && d3 == 0.0 && d4 == 0.0)
}

fn in_rect(p: P, min: P, max: P) -> bool {
    p.0 >= min.0 && p.0 <= max.0 && p.1 >= min.1 && p.1 <= max.1
}

fn intersects(a: &Shape, b: &Shape) -> bool {
    match (a, b) {
        (Shape::Rect { min: amin, max: amax }, Shape::Rect { min: bmin, max: bmax }) => {
            amin.0 <= bmax.0 && bmin.0 <= amax.0 && amin.1 <= bmax.1 && bmin.1 <= amax.1
        }
        (Shape::Rect { min, max }, other) | (other, Shape::Rect { min, max }) => match other {
            Shape::Point(p) => in_rect(*p, *min, *max),
            _ => segments(other).iter().any(|(s, e)| clip(*s, *e, *min, *max).is_some()),
        },
        (Shape::Point(p), Shape::Point(q)) => p == q,
        _ => segments(a)
            .iter()
            .any(|sa| segments(b).iter().any(|sb| segments_cross(*sa, *sb))),
    }
}

fn distance_m(a: &Shape, b: &Shape) -> f64 {
    if intersects(a, b) {
        return 0.0;
    }
    let mut best = f64::MAX;
    for sa in segments(a) {
        for sb in segments(b) {
            best = best
                .min(point_segment_m(sa.0, sb.0, sb.1))
                .min(point_segment_m(sa.1, sb.0, sb.1))
                .min(point_segment_m(sb.0, sa.0, sa.1))
                .min(point_segment_m(sb.1, sa.0, sa.1));
        }
    }
    best
}

fn length_m(shape: &Shape) -> f64 {
    match shape {
        Shape::Line(_) => segments(shape).iter().map(|(a, b)| haversine(*a, *b)).sum(),
        _ => 0.0,
    }
}

fn covered_length_m(line: &Shape, other: &Shape) -> f64 {
    match other {
        Shape::Rect { min, max } => segments(line)
            .iter()
            .filter_map(|(a, b)| clip(*a, *b, *min, *max))
            .map(|(a, b)| haversine(a, b))
            .sum(),
        _ => 0.0,
    }
}

fn area(shape: &Shape) -> f64 {
    match shape {
        Shape::Rect { min, max } => (max.0 - min.0) * (max.1 - min.1),
        _ => 0.0,
    }
}

fn overlap_area(a: &Shape, b: &Shape) -> f64 {
    match (a, b) {
        (Shape::Rect { min: amin, max: amax }, Shape::Rect { min: bmin, max: bmax }) => {
            let w = amax.0.min(bmax.0) - amin.0.max(bmin.0);
            let h = amax.1.min(bmax.1) - amin.1.max(bmin.1);
            w.max(0.0) * h.max(0.0)
        }
        _ => 0.0,
    }
}

// ===== Mock store =====

/// One pivot row; `keys` maps foreign key column to id
#[derive(Debug, Clone)]
pub struct PivotRow {
    pub keys: BTreeMap<String, i64>,
    pub percentage: Option<f64>,
    pub buffer: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct MockStore {
    entities: RwLock<BTreeMap<(EntityType, i64), SpatialEntity>>,
    pivots: RwLock<HashMap<String, Vec<PivotRow>>>,
    arrays: RwLock<HashMap<(String, String, i64), Vec<i64>>>,
    statuses: RwLock<HashMap<i64, RouteStatus>>,
    snapshots: RwLock<HashMap<i64, serde_json::Value>>,
    failures: RwLock<HashMap<&'static str, usize>>,
    calls: RwLock<HashMap<&'static str, usize>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entities: RwLock::new(BTreeMap::new()),
            pivots: RwLock::new(HashMap::new()),
            arrays: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            calls: RwLock::new(HashMap::new()),
        })
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            geometry: self.clone(),
            relations: self.clone(),
            snapshots: self.clone(),
        }
    }

    /// Insert or overwrite an entity row and return it
    pub fn put(&self, entity_type: EntityType, id: i64, geometry: Option<Geometry>) -> SpatialEntity {
        self.insert(SpatialEntity::new(entity_type, id, geometry))
    }

    pub fn insert(&self, entity: SpatialEntity) -> SpatialEntity {
        self.entities
            .write()
            .insert((entity.entity_type, entity.id), entity.clone());
        entity
    }

    pub fn set_status(&self, route_id: i64, status: RouteStatus) {
        self.statuses.write().insert(route_id, status);
    }

    /// Make the next `times` calls of `op` fail
    pub fn fail_next(&self, op: &'static str, times: usize) {
        self.failures.write().insert(op, times);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.read().get(op).copied().unwrap_or(0)
    }

    pub fn rows(&self, table: &str) -> Vec<PivotRow> {
        self.pivots.read().get(table).cloned().unwrap_or_default()
    }

    /// `other_key` id → percentage of every row where `key` equals `id`
    pub fn pairs(&self, table: &str, key: &str, id: i64, other_key: &str) -> BTreeMap<i64, Option<f64>> {
        self.rows(table)
            .into_iter()
            .filter(|r| r.keys.get(key) == Some(&id))
            .filter_map(|r| r.keys.get(other_key).map(|other| (*other, r.percentage)))
            .collect()
    }

    pub fn id_array(&self, table: &str, column: &str, id: i64) -> Option<Vec<i64>> {
        self.arrays
            .read()
            .get(&(table.to_string(), column.to_string(), id))
            .cloned()
    }

    pub fn set_id_array(&self, table: &str, column: &str, id: i64, ids: Vec<i64>) {
        self.arrays
            .write()
            .insert((table.to_string(), column.to_string(), id), ids);
    }

    pub fn snapshot(&self, region_id: i64) -> Option<serde_json::Value> {
        self.snapshots.read().get(&region_id).cloned()
    }

    pub fn print_state(&self, context: &str) {
        println!("\n========== Store State: {} ==========", context);
        let pivots = self.pivots.read();
        let mut tables: Vec<_> = pivots.keys().collect();
        tables.sort();
        for table in tables {
            println!("  {}: {} rows", table, pivots[table].len());
            for row in &pivots[table] {
                println!("    {:?} pct={:?} buffer={:?}", row.keys, row.percentage, row.buffer);
            }
        }
        println!("=================================================\n");
    }

    fn enter(&self, op: &'static str) -> anyhow::Result<()> {
        *self.calls.write().entry(op).or_default() += 1;
        let mut failures = self.failures.write();
        if let Some(left) = failures.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                anyhow::bail!("injected failure in {op}");
            }
        }
        Ok(())
    }

    fn of_type(&self, entity_type: EntityType) -> Vec<SpatialEntity> {
        self.entities
            .read()
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GeometryRepository for MockStore {
    async fn find_entity(&self, entity: &EntityDescriptor, id: i64) -> anyhow::Result<Option<SpatialEntity>> {
        self.enter("find_entity")?;
        Ok(self.entities.read().get(&(entity.entity_type, id)).cloned())
    }

    async fn intersecting(
        &self,
        geometry: &Geometry,
        target: &EntityDescriptor,
    ) -> anyhow::Result<Vec<SpatialEntity>> {
        self.enter("intersecting")?;
        let shape = parse(geometry);
        Ok(self
            .of_type(target.entity_type)
            .into_iter()
            .filter(|e| e.geometry.as_ref().is_some_and(|g| intersects(&shape, &parse(g))))
            .collect())
    }

    async fn within_distance(
        &self,
        geometry: &Geometry,
        target: &EntityDescriptor,
        buffer_meters: i64,
        partition: Option<i64>,
        exclude_id: Option<i64>,
    ) -> anyhow::Result<Vec<i64>> {
        self.enter("within_distance")?;
        let shape = parse(geometry);
        Ok(self
            .of_type(target.entity_type)
            .into_iter()
            .filter(|e| Some(e.id) != exclude_id)
            .filter(|e| match (&target.partition_column, partition) {
                (Some(_), Some(key)) => e.partition_key == Some(key),
                _ => true,
            })
            .filter(|e| {
                e.geometry
                    .as_ref()
                    .is_some_and(|g| distance_m(&shape, &parse(g)) <= buffer_meters as f64)
            })
            .map(|e| e.id)
            .collect())
    }

    async fn measure_overlap(
        &self,
        base: &Geometry,
        target: &Geometry,
        method: OverlapMethod,
    ) -> anyhow::Result<OverlapMeasure> {
        self.enter("measure_overlap")?;
        let (base, target) = (parse(base), parse(target));
        Ok(match method {
            OverlapMethod::SpheroidLength { reference } => {
                let (reference, other) = match reference {
                    Operand::Base => (&base, &target),
                    Operand::Target => (&target, &base),
                };
                OverlapMeasure {
                    covered: covered_length_m(reference, other),
                    total: length_m(reference),
                }
            }
            OverlapMethod::ProjectedArea { reference, .. } => OverlapMeasure {
                covered: overlap_area(&base, &target),
                total: match reference {
                    Operand::Base => area(&base),
                    Operand::Target => area(&target),
                },
            },
        })
    }

    async fn list_ids(&self, entity: &EntityDescriptor) -> anyhow::Result<Vec<i64>> {
        self.enter("list_ids")?;
        Ok(self.of_type(entity.entity_type).into_iter().map(|e| e.id).collect())
    }
}

#[async_trait]
impl RelationRepository for MockStore {
    async fn replace_edges(
        &self,
        pivot: &PivotDescriptor,
        base_id: i64,
        edges: &[IntersectionEdge],
    ) -> anyhow::Result<()> {
        self.enter("replace_edges")?;
        self.pivots
            .write()
            .entry(pivot.table.clone())
            .or_default()
            .retain(|r| r.keys.get(&pivot.foreign_key_a) != Some(&base_id));

        // Delete and insert are separate statements; let other tasks run in between
        tokio::task::yield_now().await;

        let mut pivots = self.pivots.write();
        let rows = pivots.entry(pivot.table.clone()).or_default();
        rows.extend(edges.iter().map(|edge| PivotRow {
            keys: BTreeMap::from([
                (pivot.foreign_key_a.clone(), edge.base_id),
                (pivot.foreign_key_b.clone(), edge.target_id),
            ]),
            percentage: edge.percentage,
            buffer: None,
            created_at: edge.created_at,
            updated_at: edge.updated_at,
        }));
        Ok(())
    }

    async fn attach_edges(
        &self,
        pivot: &PivotDescriptor,
        _base_id: i64,
        edges: &[ProximityEdge],
    ) -> anyhow::Result<()> {
        self.enter("attach_edges")?;
        let mut pivots = self.pivots.write();
        let rows = pivots.entry(pivot.table.clone()).or_default();
        for edge in edges {
            let existing = rows.iter_mut().find(|r| {
                r.keys.get(&pivot.foreign_key_a) == Some(&edge.base_id)
                    && r.keys.get(&pivot.foreign_key_b) == Some(&edge.target_id)
            });
            match existing {
                Some(row) => {
                    row.buffer = Some(edge.buffer_meters);
                    row.updated_at = edge.updated_at;
                }
                None => rows.push(PivotRow {
                    keys: BTreeMap::from([
                        (pivot.foreign_key_a.clone(), edge.base_id),
                        (pivot.foreign_key_b.clone(), edge.target_id),
                    ]),
                    percentage: None,
                    buffer: Some(edge.buffer_meters),
                    created_at: edge.created_at,
                    updated_at: edge.updated_at,
                }),
            }
        }
        Ok(())
    }

    async fn read_id_array(
        &self,
        entity: &EntityDescriptor,
        column: &str,
        id: i64,
    ) -> anyhow::Result<Option<Vec<i64>>> {
        self.enter("read_id_array")?;
        Ok(self.id_array(&entity.table, column, id))
    }

    async fn write_id_array(
        &self,
        entity: &EntityDescriptor,
        column: &str,
        id: i64,
        ids: &[i64],
    ) -> anyhow::Result<()> {
        self.enter("write_id_array")?;
        self.set_id_array(&entity.table, column, id, ids.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for MockStore {
    async fn route_statuses_within(&self, geometry: &Geometry) -> anyhow::Result<Vec<(i64, RouteStatus)>> {
        self.enter("route_statuses_within")?;
        let shape = parse(geometry);
        let statuses = self.statuses.read();
        Ok(self
            .of_type(EntityType::HikingRoute)
            .into_iter()
            .filter(|e| e.geometry.as_ref().is_some_and(|g| intersects(&shape, &parse(g))))
            .map(|e| (e.id, statuses.get(&e.id).cloned().unwrap_or_default()))
            .collect())
    }

    async fn write_region_snapshot(&self, region_id: i64, document: serde_json::Value) -> anyhow::Result<()> {
        self.enter("write_region_snapshot")?;
        self.snapshots.write().insert(region_id, document);
        Ok(())
    }
}
