//! Proximity sync: "nearby" relationships within a metric buffer
//!
//! Enrichment here is best-effort. Every failure is logged and swallowed so a
//! broken neighbour lookup never aborts the caller or floods the queue with
//! retries.

use super::lock::{EntityLock, LockKey};
use super::registry::{EntityRegistry, PivotDescriptor};
use super::repository::{GeometryRepository, RelationRepository};
use crate::contract::{
    EntityType, GeoSyncError, Geometry, HasGeometry, ProximityEdge, ValidationReason,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How neighbours of a base entity are materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProximityStrategy {
    /// Attach to the proximity pivot, never detaching earlier neighbours
    MergePivot,
    /// Sorted id list in a JSON column of the base row, written only on change
    ReplaceArray { column: String },
}

/// One configured proximity relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProximityRule {
    pub base: EntityType,
    pub target: EntityType,
    pub buffer_meters: i64,
    pub strategy: ProximityStrategy,
}

impl ProximityRule {
    pub fn new(base: EntityType, target: EntityType, buffer_meters: i64, strategy: ProximityStrategy) -> Self {
        Self {
            base,
            target,
            buffer_meters,
            strategy,
        }
    }
}

/// Result of one proximity unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProximityOutcome {
    /// A precondition failed; nothing was queried or written
    Skipped(ValidationReason),
    /// `attached` neighbours were merged into the pivot
    Merged { attached: usize },
    /// Sorted neighbour set equals the stored one; nothing was written
    Unchanged,
    /// Stored id array was overwritten with `neighbours` ids
    Replaced { neighbours: usize },
    /// Error logged and swallowed
    Failed,
}

enum Sink {
    Pivot(PivotDescriptor),
    Array(String),
}

pub struct ProximitySync {
    registry: Arc<EntityRegistry>,
    geometry: Arc<dyn GeometryRepository>,
    relations: Arc<dyn RelationRepository>,
    rules: Vec<ProximityRule>,
    known_partitions: Vec<i64>,
}

impl ProximitySync {
    pub fn new(
        registry: Arc<EntityRegistry>,
        geometry: Arc<dyn GeometryRepository>,
        relations: Arc<dyn RelationRepository>,
        rules: Vec<ProximityRule>,
        known_partitions: Vec<i64>,
    ) -> Self {
        Self {
            registry,
            geometry,
            relations,
            rules,
            known_partitions,
        }
    }

    pub fn rules(&self) -> &[ProximityRule] {
        &self.rules
    }

    /// Strategy configured for the pair; pairs without a rule merge into a pivot
    pub fn strategy_for(&self, base: EntityType, target: EntityType) -> ProximityStrategy {
        self.rules
            .iter()
            .find(|r| r.base == base && r.target == target)
            .map(|r| r.strategy.clone())
            .unwrap_or(ProximityStrategy::MergePivot)
    }

    /// Find `target` rows within `buffer_meters` of `base` and record them
    pub async fn sync(
        &self,
        base: &dyn HasGeometry,
        target: EntityType,
        buffer_meters: i64,
        lock: &dyn EntityLock,
    ) -> ProximityOutcome {
        match self.run(base, target, buffer_meters, lock).await {
            Ok(outcome) => {
                tracing::debug!(
                    entity = %base.entity_type(),
                    base_id = base.id(),
                    target = %target,
                    buffer_meters,
                    ?outcome,
                    "proximity sync done"
                );
                outcome
            }
            Err(GeoSyncError::Validation { reason, .. }) => {
                tracing::warn!(
                    entity = %base.entity_type(),
                    base_id = base.id(),
                    target = %target,
                    "proximity sync skipped: {}",
                    reason
                );
                ProximityOutcome::Skipped(reason)
            }
            Err(e) => {
                tracing::error!(
                    entity = %base.entity_type(),
                    base_id = base.id(),
                    target = %target,
                    buffer_meters,
                    error_kind = e.kind(),
                    "proximity sync failed: {}",
                    e
                );
                ProximityOutcome::Failed
            }
        }
    }

    fn validate<'a>(
        &self,
        base: &'a dyn HasGeometry,
        buffer_meters: i64,
    ) -> Result<&'a Geometry, ValidationReason> {
        let Some(geometry) = base.geometry() else {
            return Err(ValidationReason::MissingGeometry);
        };
        if buffer_meters < 0 {
            return Err(ValidationReason::NegativeBuffer(buffer_meters));
        }
        let partitioned = self
            .registry
            .descriptor(base.entity_type())
            .map(|d| d.partition_column.is_some())
            .unwrap_or(false);
        if partitioned {
            match base.partition_key() {
                None => return Err(ValidationReason::MissingPartition),
                Some(key) if !self.known_partitions.is_empty() && !self.known_partitions.contains(&key) => {
                    return Err(ValidationReason::UnknownPartition(key));
                }
                Some(_) => {}
            }
        }
        Ok(geometry)
    }

    async fn run(
        &self,
        base: &dyn HasGeometry,
        target: EntityType,
        buffer_meters: i64,
        lock: &dyn EntityLock,
    ) -> Result<ProximityOutcome, GeoSyncError> {
        let base_type = base.entity_type();
        let geometry = self
            .validate(base, buffer_meters)
            .map_err(|reason| GeoSyncError::Validation {
                entity: base_type,
                id: base.id(),
                reason,
            })?;

        let base_desc = self.registry.descriptor(base_type)?;
        let target_desc = self.registry.descriptor(target)?;
        let sink = match self.strategy_for(base_type, target) {
            ProximityStrategy::MergePivot => Sink::Pivot(self.registry.resolve_table(base_type, target)?),
            ProximityStrategy::ReplaceArray { column } => Sink::Array(column),
        };

        let store_err = |cause| GeoSyncError::store(base_desc.table.clone(), base.id(), cause);

        // Candidates share the base partition when the target table is partitioned
        let partition = target_desc
            .partition_column
            .as_ref()
            .and(base.partition_key());
        let exclude = (base_type == target).then(|| base.id());
        let mut ids = self
            .geometry
            .within_distance(geometry, target_desc, buffer_meters, partition, exclude)
            .await
            .map_err(store_err)?;

        match sink {
            Sink::Pivot(pivot) => {
                if ids.is_empty() {
                    return Ok(ProximityOutcome::Merged { attached: 0 });
                }
                let now = Utc::now();
                let edges: Vec<ProximityEdge> = ids
                    .iter()
                    .map(|&target_id| ProximityEdge {
                        base_id: base.id(),
                        target_id,
                        buffer_meters,
                        created_at: now,
                        updated_at: now,
                    })
                    .collect();
                self.relations
                    .attach_edges(&pivot, base.id(), &edges)
                    .await
                    .map_err(store_err)?;
                Ok(ProximityOutcome::Merged {
                    attached: edges.len(),
                })
            }
            Sink::Array(column) => {
                ids.sort_unstable();
                ids.dedup();

                let _guard = lock
                    .acquire(LockKey::pair(base_type, base.id(), target))
                    .await
                    .map_err(store_err)?;
                let mut current = self
                    .relations
                    .read_id_array(base_desc, &column, base.id())
                    .await
                    .map_err(store_err)?
                    .unwrap_or_default();
                current.sort_unstable();
                current.dedup();

                if current == ids {
                    return Ok(ProximityOutcome::Unchanged);
                }
                self.relations
                    .write_id_array(base_desc, &column, base.id(), &ids)
                    .await
                    .map_err(store_err)?;
                Ok(ProximityOutcome::Replaced {
                    neighbours: ids.len(),
                })
            }
        }
    }
}
