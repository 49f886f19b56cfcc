//! Queued units of work
//!
//! A job carries identifiers and primitives only. Geometry is re-fetched by the
//! worker, so a job serializes to a few bytes of JSON and stays valid however
//! long it waits.

use super::lock::LockKey;
use crate::contract::{EnqueueRequest, EntityType, GeoSyncError, SnapshotScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum SyncJob {
    Intersections {
        base_type: EntityType,
        base_id: i64,
        target_type: EntityType,
    },
    Proximity {
        base_type: EntityType,
        base_id: i64,
        target_type: EntityType,
        buffer_meters: i64,
    },
    RegionSnapshot {
        scope: SnapshotScope,
    },
}

impl SyncJob {
    pub fn intersections(base_type: EntityType, base_id: i64, target_type: EntityType) -> Self {
        Self::Intersections {
            base_type,
            base_id,
            target_type,
        }
    }

    pub fn proximity(base_type: EntityType, base_id: i64, target_type: EntityType, buffer_meters: i64) -> Self {
        Self::Proximity {
            base_type,
            base_id,
            target_type,
            buffer_meters,
        }
    }

    /// Key serializing units that rewrite the same rows
    pub fn lock_key(&self) -> LockKey {
        match *self {
            Self::Intersections {
                base_type,
                base_id,
                target_type,
            }
            | Self::Proximity {
                base_type,
                base_id,
                target_type,
                ..
            } => LockKey::pair(base_type, base_id, target_type),
            Self::RegionSnapshot { scope } => match scope {
                SnapshotScope::Region(id) => LockKey::entity(EntityType::Region, id),
                SnapshotScope::HikingRoute(id) => LockKey::entity(EntityType::HikingRoute, id),
                SnapshotScope::AllRegions => LockKey::entity(EntityType::Region, 0),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Intersections { .. } => "intersections",
            Self::Proximity { .. } => "proximity",
            Self::RegionSnapshot { .. } => "region_snapshot",
        }
    }

    pub fn to_wire(&self) -> Result<String, GeoSyncError> {
        serde_json::to_string(self).map_err(|e| GeoSyncError::Queue(e.to_string()))
    }

    pub fn from_wire(payload: &str) -> Result<Self, GeoSyncError> {
        serde_json::from_str(payload).map_err(|e| GeoSyncError::Queue(e.to_string()))
    }
}

impl From<EnqueueRequest> for SyncJob {
    fn from(request: EnqueueRequest) -> Self {
        match request.buffer_meters {
            Some(buffer_meters) => Self::proximity(
                request.base_type,
                request.base_id,
                request.target_type,
                buffer_meters,
            ),
            None => Self::intersections(request.base_type, request.base_id, request.target_type),
        }
    }
}

impl fmt::Display for SyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proximity { buffer_meters, .. } => {
                write!(f, "{}[{}@{}m]", self.name(), self.lock_key(), buffer_meters)
            }
            _ => write!(f, "{}[{}]", self.name(), self.lock_key()),
        }
    }
}

/// Destination of enqueued jobs
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Hand a job to the queue; `Ok(false)` means an identical job is already pending
    async fn submit(&self, job: SyncJob) -> Result<bool, GeoSyncError>;
}

/// Sink dropping every job, for hosts that run without background workers
pub struct NoOpJobSink;

#[async_trait]
impl JobSink for NoOpJobSink {
    async fn submit(&self, _job: SyncJob) -> Result<bool, GeoSyncError> {
        Ok(false)
    }
}
