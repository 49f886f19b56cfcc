//! Configuration for the geo relations module

use crate::contract::EntityType;
use crate::domain::overlap::DEFAULT_AREA_SRID;
use crate::domain::proximity::{ProximityRule, ProximityStrategy};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment prefix; nested keys use `__`, e.g. `GEO_RELATIONS_RETRY_BACKOFF=10s`
pub const ENV_PREFIX: &str = "GEO_RELATIONS_";

/// Geo relations module configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of queue workers
    ///
    /// A worker holding an advisory lock keeps one pooled connection for the
    /// lock and needs another for the write, so the pool must allow more
    /// connections than there are workers (see [`Config::check_pool`]).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded queue capacity; submitters wait when it is full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per unit for retryable (store) failures, first run included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before a failed unit is re-queued
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Planar projection used for polygon areas
    #[serde(default = "default_area_srid")]
    pub area_srid: i32,

    /// Partitions accepted for proximity units; empty accepts any non-null key
    #[serde(default)]
    pub known_partitions: Vec<i64>,

    /// Proximity relationships maintained on geometry change
    #[serde(default = "default_proximity_rules")]
    pub proximity: Vec<ProximityRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
            area_srid: default_area_srid(),
            known_partitions: Vec::new(),
            proximity: default_proximity_rules(),
        }
    }
}

impl Config {
    /// Defaults, then the optional YAML file, then `GEO_RELATIONS_*` variables
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject pools too small for `workers` lock holders plus one writer
    pub fn check_pool(&self, max_connections: u32) -> anyhow::Result<()> {
        let workers = u32::try_from(self.workers).unwrap_or(u32::MAX);
        if max_connections <= workers {
            anyhow::bail!(
                "database pool allows {} connections, {} workers need at least {}",
                max_connections,
                self.workers,
                workers.saturating_add(1)
            );
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if let Some(rule) = self.proximity.iter().find(|r| r.buffer_meters < 0) {
            anyhow::bail!(
                "proximity rule {} -> {} has a negative buffer",
                rule.base,
                rule.target
            );
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_area_srid() -> i32 {
    DEFAULT_AREA_SRID
}

/// Hut and spring neighbours of hiking routes, plus POIs along them
pub fn default_proximity_rules() -> Vec<ProximityRule> {
    vec![
        ProximityRule::new(
            EntityType::HikingRoute,
            EntityType::CaiHut,
            250,
            ProximityStrategy::ReplaceArray {
                column: "nearby_cai_huts".to_string(),
            },
        ),
        ProximityRule::new(
            EntityType::HikingRoute,
            EntityType::NaturalSpring,
            250,
            ProximityStrategy::ReplaceArray {
                column: "nearby_natural_springs".to_string(),
            },
        ),
        ProximityRule::new(
            EntityType::HikingRoute,
            EntityType::EcPoi,
            500,
            ProximityStrategy::MergePivot,
        ),
    ]
}
