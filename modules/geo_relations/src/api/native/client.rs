//! Native client implementation - turns API calls into queued jobs

use crate::contract::{EnqueueRequest, GeoSyncApi, GeoSyncError, GeometryChanged, SnapshotScope};
use crate::domain::{ResyncDispatcher, SyncJob};
use async_trait::async_trait;
use std::sync::Arc;

/// In-process client; every call returns once the work is queued
#[derive(Clone)]
pub struct NativeClient {
    dispatcher: Arc<ResyncDispatcher>,
}

impl NativeClient {
    pub fn new(dispatcher: Arc<ResyncDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl GeoSyncApi for NativeClient {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<bool, GeoSyncError> {
        self.dispatcher.submit(SyncJob::from(request)).await
    }

    async fn geometry_changed(&self, event: GeometryChanged) -> Result<usize, GeoSyncError> {
        self.dispatcher.dispatch(event).await
    }

    async fn refresh_snapshots(&self, scope: SnapshotScope) -> Result<bool, GeoSyncError> {
        self.dispatcher.submit(SyncJob::RegionSnapshot { scope }).await
    }
}
