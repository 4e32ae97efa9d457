use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::models::SampleCategory;
use crate::digest::DIGEST_BITS;
use crate::errors::EngineError;
use crate::index::DEFAULT_LEAF_SIZE;

/// DBSCAN parameters for one sample category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbscanParams {
    /// Maximum Hamming distance (bits) between neighbors.
    pub epsilon: u32,
    /// Neighborhood size, the point itself included, that makes a core point.
    pub min_points: usize,
}

impl DbscanParams {
    pub fn new(epsilon: u32, min_points: usize) -> Self {
        Self {
            epsilon,
            min_points,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_points == 0 {
            return Err(EngineError::InvalidParameter(
                "min_points must be >= 1".into(),
            ));
        }
        if self.epsilon > DIGEST_BITS {
            return Err(EngineError::InvalidParameter(format!(
                "epsilon {} exceeds digest width of {} bits",
                self.epsilon, DIGEST_BITS
            )));
        }
        Ok(())
    }
}

/// Tunables for a clustering and retention run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub inline: DbscanParams,
    pub event: DbscanParams,

    /// Ball tree leaf capacity.
    pub leaf_size: usize,

    /// Maximum members kept per cluster by the retention pass.
    pub cluster_limit: usize,

    /// Apply the cluster cap to the `Unclustered` bucket as well.
    pub cap_unclustered: bool,

    pub max_parallel_partitions: usize,

    /// Wall-clock budget for a clustering run; partitions not yet started
    /// when it expires are skipped.
    pub time_limit_secs: Option<u64>,

    /// Random draws per cluster name before giving up.
    pub name_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inline: DbscanParams::new(70, 3),
            event: DbscanParams::new(70, 3),
            leaf_size: DEFAULT_LEAF_SIZE,
            cluster_limit: 150,
            cap_unclustered: true,
            max_parallel_partitions: 4,
            time_limit_secs: None,
            name_attempts: 1000,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse engine config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn params_for(&self, category: SampleCategory) -> DbscanParams {
        match category {
            SampleCategory::Inline => self.inline,
            SampleCategory::Event => self.event,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.inline.validate()?;
        self.event.validate()?;
        if self.leaf_size == 0 {
            return Err(EngineError::Config("leaf_size must be >= 1".into()));
        }
        if self.cluster_limit == 0 {
            return Err(EngineError::Config("cluster_limit must be >= 1".into()));
        }
        if self.max_parallel_partitions == 0 {
            return Err(EngineError::Config(
                "max_parallel_partitions must be >= 1".into(),
            ));
        }
        if self.name_attempts == 0 {
            return Err(EngineError::Config("name_attempts must be >= 1".into()));
        }
        Ok(())
    }
}
