//! Region snapshot: denormalized status of every hiking route crossing a region
//!
//! Each run recomputes the whole document from the store and overwrites the
//! stored one; nothing is patched incrementally.

use super::registry::EntityRegistry;
use super::repository::{GeometryRepository, SnapshotRepository};
use crate::contract::{EntityType, GeoSyncError, HasGeometry, RegionSnapshot};
use std::sync::Arc;

pub struct RegionSnapshotAggregator {
    registry: Arc<EntityRegistry>,
    geometry: Arc<dyn GeometryRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
}

impl RegionSnapshotAggregator {
    pub fn new(
        registry: Arc<EntityRegistry>,
        geometry: Arc<dyn GeometryRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
    ) -> Self {
        Self {
            registry,
            geometry,
            snapshots,
        }
    }

    /// Rebuild and store the snapshot of one region
    ///
    /// Returns `None` when the region has no geometry and nothing was written.
    pub async fn for_region(&self, region: &dyn HasGeometry) -> Result<Option<RegionSnapshot>, GeoSyncError> {
        let table = &self.registry.descriptor(EntityType::Region)?.table;
        let Some(geometry) = region.geometry() else {
            tracing::debug!(region_id = region.id(), "region has no geometry, snapshot untouched");
            return Ok(None);
        };
        let store_err = |cause| GeoSyncError::store(table.clone(), region.id(), cause);

        let snapshot: RegionSnapshot = self
            .snapshots
            .route_statuses_within(geometry)
            .await
            .map_err(store_err)?
            .into_iter()
            .collect();

        let document = serde_json::to_value(&snapshot).map_err(|e| store_err(e.into()))?;
        self.snapshots
            .write_region_snapshot(region.id(), document)
            .await
            .map_err(store_err)?;

        tracing::info!(region_id = region.id(), routes = snapshot.len(), "region snapshot rebuilt");
        Ok(Some(snapshot))
    }

    /// Rebuild the snapshot of every region the route crosses; returns regions rebuilt
    pub async fn for_hiking_route(&self, route: &dyn HasGeometry) -> Result<usize, GeoSyncError> {
        let Some(geometry) = route.geometry() else {
            tracing::debug!(route_id = route.id(), "hiking route has no geometry, no snapshots to refresh");
            return Ok(0);
        };
        let region_desc = self.registry.descriptor(EntityType::Region)?;
        let route_table = &self.registry.descriptor(EntityType::HikingRoute)?.table;

        let regions = self
            .geometry
            .intersecting(geometry, region_desc)
            .await
            .map_err(|cause| GeoSyncError::store(route_table.clone(), route.id(), cause))?;

        let mut rebuilt = 0;
        for region in &regions {
            if self.for_region(region).await?.is_some() {
                rebuilt += 1;
            }
        }
        Ok(rebuilt)
    }

    /// Rebuild every region; a failing region is logged and the walk goes on
    pub async fn for_all_regions(&self) -> Result<usize, GeoSyncError> {
        let region_desc = self.registry.descriptor(EntityType::Region)?;
        let ids = self
            .geometry
            .list_ids(region_desc)
            .await
            .map_err(|cause| GeoSyncError::store(region_desc.table.clone(), 0, cause))?;

        let mut rebuilt = 0;
        for id in ids {
            let region = match self.geometry.find_entity(region_desc, id).await {
                Ok(Some(region)) => region,
                Ok(None) => continue,
                Err(cause) => {
                    let e = GeoSyncError::store(region_desc.table.clone(), id, cause);
                    tracing::error!(region_id = id, error_kind = e.kind(), "region snapshot failed: {}", e);
                    continue;
                }
            };
            match self.for_region(&region).await {
                Ok(Some(_)) => rebuilt += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(region_id = id, error_kind = e.kind(), "region snapshot failed: {}", e);
                }
            }
        }
        Ok(rebuilt)
    }
}
