//! Storage layer - PostGIS repositories, advisory locks and migrations

pub mod entity;
pub mod lock;
pub mod mapper;
pub mod migrations;
pub mod repositories;

pub use lock::PgAdvisoryLock;
pub use repositories::{SeaOrmGeometryRepository, SeaOrmRelationRepository, SeaOrmSnapshotRepository};
