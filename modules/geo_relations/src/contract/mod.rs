//! Contract layer - public API for inter-module communication
//!
//! This layer contains transport-agnostic models and the native client trait.

pub mod client;
pub mod error;
pub mod model;

pub use client::GeoSyncApi;
pub use error::{GeoSyncError, ValidationReason};
pub use model::{
    EnqueueRequest, EntityType, Geometry, GeometryChanged, GeometryKind, HasGeometry,
    IntersectionEdge, ProximityEdge, RegionSnapshot, RouteStatus, SnapshotScope, SpatialEntity,
};
