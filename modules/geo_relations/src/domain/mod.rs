//! Domain layer - sync engines and job orchestration

pub mod events;
pub mod intersection;
pub mod jobs;
pub mod lock;
pub mod overlap;
pub mod proximity;
pub mod registry;
pub mod repository;
pub mod service;
pub mod snapshot;

pub use events::ResyncDispatcher;
pub use intersection::{IntersectionOutcome, IntersectionSync};
pub use jobs::{JobSink, NoOpJobSink, SyncJob};
pub use lock::{EntityLock, KeyedLocks, LockGuard, LockKey};
pub use overlap::OverlapCalculator;
pub use proximity::{ProximityOutcome, ProximityRule, ProximityStrategy, ProximitySync};
pub use registry::{EntityDescriptor, EntityRegistry, PivotDescriptor};
pub use repository::{GeometryRepository, RelationRepository, SnapshotRepository};
pub use service::{JobOutcome, Repositories, Service};
pub use snapshot::RegionSnapshotAggregator;
