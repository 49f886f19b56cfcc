//! Geo Relations Module
//!
//! Derives and persists spatial relationships between catalogue entities:
//! intersection pivots with overlap percentages, proximity links within a
//! buffer distance, and per-region snapshots of intersecting hiking routes.
//! Work is requested through [`GeoSyncApi`] and executed by background workers.

// Public exports
pub mod contract;
pub use contract::{
    client::GeoSyncApi, error::GeoSyncError, EnqueueRequest, EntityType, Geometry,
    GeometryChanged, GeometryKind, HasGeometry, RouteStatus, SnapshotScope, SpatialEntity,
};

pub mod module;
pub use module::GeoRelationsModule;

pub mod config;
pub use config::Config;

// Internal modules (hidden from public API)
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;
