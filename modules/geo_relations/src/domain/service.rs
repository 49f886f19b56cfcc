//! Domain service - runs one queued unit against the store

use super::intersection::{IntersectionOutcome, IntersectionSync};
use super::lock::EntityLock;
use super::overlap::OverlapCalculator;
use super::proximity::{ProximityOutcome, ProximityRule, ProximitySync};
use super::registry::EntityRegistry;
use super::repository::{GeometryRepository, RelationRepository, SnapshotRepository};
use super::jobs::SyncJob;
use super::snapshot::RegionSnapshotAggregator;
use crate::contract::{EntityType, GeoSyncError, SnapshotScope, SpatialEntity};
use std::sync::Arc;

/// What a unit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Base entity no longer exists
    Missing,
    Intersections(IntersectionOutcome),
    Proximity(ProximityOutcome),
    /// Number of region snapshots rebuilt
    Snapshots(usize),
}

/// Everything a worker needs, wired once per process
pub struct Service {
    registry: Arc<EntityRegistry>,
    geometry: Arc<dyn GeometryRepository>,
    lock: Arc<dyn EntityLock>,
    intersections: IntersectionSync,
    proximity: ProximitySync,
    snapshots: RegionSnapshotAggregator,
}

/// Store handles the service is built from
pub struct Repositories {
    pub geometry: Arc<dyn GeometryRepository>,
    pub relations: Arc<dyn RelationRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
}

impl Service {
    pub fn new(
        registry: Arc<EntityRegistry>,
        repos: Repositories,
        lock: Arc<dyn EntityLock>,
        area_srid: i32,
        rules: Vec<ProximityRule>,
        known_partitions: Vec<i64>,
    ) -> Self {
        let overlap = Arc::new(OverlapCalculator::new(repos.geometry.clone(), area_srid));
        Self {
            intersections: IntersectionSync::new(
                registry.clone(),
                repos.geometry.clone(),
                repos.relations.clone(),
                overlap,
            ),
            proximity: ProximitySync::new(
                registry.clone(),
                repos.geometry.clone(),
                repos.relations,
                rules,
                known_partitions,
            ),
            snapshots: RegionSnapshotAggregator::new(
                registry.clone(),
                repos.geometry.clone(),
                repos.snapshots,
            ),
            registry,
            geometry: repos.geometry,
            lock,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn intersections(&self) -> &IntersectionSync {
        &self.intersections
    }

    pub fn proximity(&self) -> &ProximitySync {
        &self.proximity
    }

    pub fn snapshots(&self) -> &RegionSnapshotAggregator {
        &self.snapshots
    }

    /// Execute one unit; only retryable errors should lead to a re-run
    pub async fn run(&self, job: &SyncJob) -> Result<JobOutcome, GeoSyncError> {
        match *job {
            SyncJob::Intersections {
                base_type,
                base_id,
                target_type,
            } => {
                let Some(base) = self.load(base_type, base_id).await? else {
                    return Ok(JobOutcome::Missing);
                };
                self.intersections
                    .sync(&base, target_type, self.lock.as_ref())
                    .await
                    .map(JobOutcome::Intersections)
            }
            SyncJob::Proximity {
                base_type,
                base_id,
                target_type,
                buffer_meters,
            } => {
                let base = match self.load(base_type, base_id).await {
                    Ok(Some(base)) => base,
                    Ok(None) => return Ok(JobOutcome::Missing),
                    Err(e) => {
                        tracing::error!(
                            entity = %base_type,
                            base_id,
                            target = %target_type,
                            error_kind = e.kind(),
                            "proximity base lookup failed: {}",
                            e
                        );
                        return Ok(JobOutcome::Proximity(ProximityOutcome::Failed));
                    }
                };
                let outcome = self
                    .proximity
                    .sync(&base, target_type, buffer_meters, self.lock.as_ref())
                    .await;
                Ok(JobOutcome::Proximity(outcome))
            }
            SyncJob::RegionSnapshot { scope } => match scope {
                SnapshotScope::Region(id) => {
                    let Some(region) = self.load(EntityType::Region, id).await? else {
                        return Ok(JobOutcome::Missing);
                    };
                    let rebuilt = self.snapshots.for_region(&region).await?;
                    Ok(JobOutcome::Snapshots(usize::from(rebuilt.is_some())))
                }
                SnapshotScope::HikingRoute(id) => {
                    let Some(route) = self.load(EntityType::HikingRoute, id).await? else {
                        return Ok(JobOutcome::Missing);
                    };
                    self.snapshots
                        .for_hiking_route(&route)
                        .await
                        .map(JobOutcome::Snapshots)
                }
                SnapshotScope::AllRegions => self
                    .snapshots
                    .for_all_regions()
                    .await
                    .map(JobOutcome::Snapshots),
            },
        }
    }

    /// Re-fetch the base entity; geometry never travels through the queue
    async fn load(&self, entity_type: EntityType, id: i64) -> Result<Option<SpatialEntity>, GeoSyncError> {
        let descriptor = self.registry.descriptor(entity_type)?;
        let entity = self
            .geometry
            .find_entity(descriptor, id)
            .await
            .map_err(|cause| GeoSyncError::store(descriptor.table.clone(), id, cause))?;
        if entity.is_none() {
            tracing::warn!(entity = %entity_type, id, "entity vanished before its job ran");
        }
        Ok(entity)
    }
}
