//! Infrastructure layer - storage and the job queue

pub mod queue;
pub mod storage;

pub use queue::{QueueSettings, QueueStats, SyncQueue};
