//! Contract error types for the geo relations module
//!
//! These errors are transport-agnostic. None of them reaches an interactive
//! caller synchronously; they surface through logs and the queue retry policy.

use super::model::EntityType;
use std::fmt;

/// Why a unit was rejected before touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    MissingGeometry,
    NegativeBuffer(i64),
    MissingPartition,
    UnknownPartition(i64),
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingGeometry => write!(f, "entity has no geometry"),
            Self::NegativeBuffer(meters) => write!(f, "negative buffer: {} m", meters),
            Self::MissingPartition => write!(f, "entity has no partition key"),
            Self::UnknownPartition(key) => write!(f, "partition {} is not recognized", key),
        }
    }
}

/// Geo relations domain errors
#[derive(Debug, thiserror::Error)]
pub enum GeoSyncError {
    /// Missing geometry, partition, or a negative buffer
    #[error("validation failed for {entity}#{id}: {reason}")]
    Validation {
        entity: EntityType,
        id: i64,
        reason: ValidationReason,
    },

    /// No pivot table is configured for the pair; deterministic, never retried
    #[error("no pivot table configured for {a} <-> {b}")]
    UnresolvedPairing { a: EntityType, b: EntityType },

    /// Entity type missing from the registry in use
    #[error("entity type {0} is not registered")]
    UnknownEntityType(EntityType),

    /// Query or write against the geometry store failed
    #[error("store error on {table}#{id}: {cause:#}")]
    Store {
        table: String,
        id: i64,
        cause: anyhow::Error,
    },

    /// Job could not be handed to the queue
    #[error("queue error: {0}")]
    Queue(String),
}

impl GeoSyncError {
    pub fn store(table: impl Into<String>, id: i64, cause: anyhow::Error) -> Self {
        Self::Store {
            table: table.into(),
            id,
            cause,
        }
    }

    /// Only transient store failures are worth re-running
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Stable label for the `error_kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::UnresolvedPairing { .. } => "unresolved_pairing",
            Self::UnknownEntityType(_) => "unknown_entity_type",
            Self::Store { .. } => "store",
            Self::Queue(_) => "queue",
        }
    }
}
