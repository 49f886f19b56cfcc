//! Geometry change dispatch
//!
//! The host emits a [`GeometryChanged`] event from its save hooks; the
//! dispatcher decides which units must be resynced and submits them. Keeping
//! "what changed" apart from "what must be recomputed" lets the trigger side be
//! tested without a store.

use super::jobs::{JobSink, SyncJob};
use super::proximity::ProximityRule;
use super::registry::EntityRegistry;
use crate::contract::{EntityType, GeoSyncError, GeometryChanged, SnapshotScope};
use std::sync::Arc;

pub struct ResyncDispatcher {
    registry: Arc<EntityRegistry>,
    rules: Vec<ProximityRule>,
    sink: Arc<dyn JobSink>,
}

impl ResyncDispatcher {
    pub fn new(registry: Arc<EntityRegistry>, rules: Vec<ProximityRule>, sink: Arc<dyn JobSink>) -> Self {
        Self {
            registry,
            rules,
            sink,
        }
    }

    /// Every unit affected by a change of `event.entity_type`
    ///
    /// One intersection unit per intersection pivot touching the type, one
    /// proximity unit per rule whose base is the type, and a snapshot refresh
    /// when a hiking route or a region moved.
    pub fn plan(&self, event: GeometryChanged) -> Vec<SyncJob> {
        let GeometryChanged {
            entity_type,
            entity_id,
        } = event;

        let mut jobs: Vec<SyncJob> = self
            .registry
            .intersection_targets(entity_type)
            .into_iter()
            .map(|target| SyncJob::intersections(entity_type, entity_id, target))
            .collect();

        jobs.extend(
            self.rules
                .iter()
                .filter(|rule| rule.base == entity_type)
                .map(|rule| SyncJob::proximity(entity_type, entity_id, rule.target, rule.buffer_meters)),
        );

        let scope = match entity_type {
            EntityType::HikingRoute => Some(SnapshotScope::HikingRoute(entity_id)),
            EntityType::Region => Some(SnapshotScope::Region(entity_id)),
            _ => None,
        };
        if let Some(scope) = scope {
            jobs.push(SyncJob::RegionSnapshot { scope });
        }

        jobs
    }

    /// Submit the plan; returns how many units the queue accepted
    pub async fn dispatch(&self, event: GeometryChanged) -> Result<usize, GeoSyncError> {
        let jobs = self.plan(event);
        let planned = jobs.len();
        let mut accepted = 0;
        for job in jobs {
            if self.sink.submit(job).await? {
                accepted += 1;
            }
        }
        tracing::debug!(
            entity = %event.entity_type,
            entity_id = event.entity_id,
            planned,
            accepted,
            "geometry change dispatched"
        );
        Ok(accepted)
    }

    pub async fn submit(&self, job: SyncJob) -> Result<bool, GeoSyncError> {
        self.sink.submit(job).await
    }
}
