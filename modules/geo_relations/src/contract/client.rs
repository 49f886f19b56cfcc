//! Native client trait for inter-module communication
//!
//! Geometry mutation hooks of the host application use this trait to request
//! recomputation. Every call only enqueues work.

use super::{
    error::GeoSyncError,
    model::{EnqueueRequest, GeometryChanged, SnapshotScope},
};
use async_trait::async_trait;

/// Geo relations API for inter-module communication
#[async_trait]
pub trait GeoSyncApi: Send + Sync {
    /// Enqueue one sync unit; returns `false` when an identical unit is already pending
    async fn enqueue(&self, request: EnqueueRequest) -> Result<bool, GeoSyncError>;

    /// Enqueue every unit affected by a geometry change; returns the number accepted
    async fn geometry_changed(&self, event: GeometryChanged) -> Result<usize, GeoSyncError>;

    /// Enqueue a region snapshot refresh
    async fn refresh_snapshots(&self, scope: SnapshotScope) -> Result<bool, GeoSyncError>;
}
