//! Intersection sync: full replace of one base entity's pivot rows

use super::lock::{EntityLock, LockKey};
use super::overlap::OverlapCalculator;
use super::registry::EntityRegistry;
use super::repository::{GeometryRepository, Operand, RelationRepository};
use crate::contract::{EntityType, GeoSyncError, HasGeometry, IntersectionEdge};
use chrono::Utc;
use std::sync::Arc;

/// Result of one intersection unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionOutcome {
    /// Base entity has no geometry; nothing was written
    Skipped,
    /// Pivot rows of the base entity were replaced by `edges` rows
    Replaced { edges: usize },
}

pub struct IntersectionSync {
    registry: Arc<EntityRegistry>,
    geometry: Arc<dyn GeometryRepository>,
    relations: Arc<dyn RelationRepository>,
    overlap: Arc<OverlapCalculator>,
}

impl IntersectionSync {
    pub fn new(
        registry: Arc<EntityRegistry>,
        geometry: Arc<dyn GeometryRepository>,
        relations: Arc<dyn RelationRepository>,
        overlap: Arc<OverlapCalculator>,
    ) -> Self {
        Self {
            registry,
            geometry,
            relations,
            overlap,
        }
    }

    /// Recompute every `target` row intersecting `base` and replace the pivot set
    ///
    /// Store failures are logged and returned so the queue can retry the unit.
    pub async fn sync(
        &self,
        base: &dyn HasGeometry,
        target: EntityType,
        lock: &dyn EntityLock,
    ) -> Result<IntersectionOutcome, GeoSyncError> {
        let result = self.run(base, target, lock).await;
        match &result {
            Ok(IntersectionOutcome::Replaced { edges }) => {
                tracing::info!(
                    entity = %base.entity_type(),
                    base_id = base.id(),
                    target = %target,
                    edges,
                    "intersections replaced"
                );
            }
            Ok(IntersectionOutcome::Skipped) => {}
            Err(e @ GeoSyncError::UnresolvedPairing { .. }) => {
                tracing::error!(
                    entity = %base.entity_type(),
                    base_id = base.id(),
                    target = %target,
                    error_kind = e.kind(),
                    "intersection sync misconfigured: {}",
                    e
                );
            }
            Err(e) => {
                let table = self
                    .registry
                    .descriptor(base.entity_type())
                    .map(|d| d.table.as_str())
                    .unwrap_or("?");
                tracing::error!(
                    table,
                    base_id = base.id(),
                    target = %target,
                    error_kind = e.kind(),
                    "intersection sync failed: {}",
                    e
                );
            }
        }
        result
    }

    async fn run(
        &self,
        base: &dyn HasGeometry,
        target: EntityType,
        lock: &dyn EntityLock,
    ) -> Result<IntersectionOutcome, GeoSyncError> {
        let base_type = base.entity_type();
        let Some(geometry) = base.geometry() else {
            tracing::debug!(entity = %base_type, base_id = base.id(), "no geometry, skipping intersections");
            return Ok(IntersectionOutcome::Skipped);
        };

        // Configuration problems abort before anything touches the store
        let base_desc = self.registry.descriptor(base_type)?;
        let target_desc = self.registry.descriptor(target)?;
        let pivot = self.registry.resolve_table(base_type, target)?;

        let store_err = |cause| GeoSyncError::store(base_desc.table.clone(), base.id(), cause);

        let hits = self
            .geometry
            .intersecting(geometry, target_desc)
            .await
            .map_err(store_err)?;

        // Polygon areas are measured against the pivot's first registered type
        let area_reference = if pivot.reversed {
            Operand::Target
        } else {
            Operand::Base
        };

        let now = Utc::now();
        let mut edges = Vec::with_capacity(hits.len());
        for hit in hits {
            let percentage = match (pivot.has_percentage, hit.geometry.as_ref()) {
                (true, Some(target_geom)) => Some(
                    self.overlap
                        .percentage(
                            geometry,
                            target_geom,
                            base_desc.kind,
                            target_desc.kind,
                            area_reference,
                        )
                        .await
                        .map_err(store_err)?,
                ),
                (true, None) => Some(0.0),
                (false, _) => None,
            };
            edges.push(IntersectionEdge {
                base_id: base.id(),
                target_id: hit.id,
                percentage,
                created_at: now,
                updated_at: now,
            });
        }

        let _guard = lock
            .acquire(LockKey::pair(base_type, base.id(), target))
            .await
            .map_err(store_err)?;
        self.relations
            .replace_edges(&pivot, base.id(), &edges)
            .await
            .map_err(store_err)?;

        Ok(IntersectionOutcome::Replaced { edges: edges.len() })
    }
}
