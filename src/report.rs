//! Run reports handed back to the caller.
//!
//! Reports serialize to JSON for tooling and render as plain text through
//! `Display` for logs and the command line.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::DbscanParams;
use crate::db::models::{PartitionKey, SampleCategory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum PartitionOutcome {
    Clustered,
    /// Fewer decodable digests than `min_points`; nothing was written.
    TooSmall,
    /// Not started because the run was cancelled or ran out of time.
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionReport {
    pub key: PartitionKey,
    pub samples: usize,
    pub invalid_digests: usize,
    pub clusters: usize,
    pub noise: usize,
    pub outcome: PartitionOutcome,
}

impl PartitionReport {
    pub fn empty(key: PartitionKey, outcome: PartitionOutcome) -> Self {
        Self {
            key,
            samples: 0,
            invalid_digests: 0,
            clusters: 0,
            noise: 0,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub category: SampleCategory,
    pub params: DbscanParams,
    pub partitions: Vec<PartitionReport>,
    /// Clusters whose members were all marked trusted by propagation.
    pub whitelisted_clusters: usize,
    pub errors: Vec<String>,
}

impl CategoryReport {
    pub fn new(category: SampleCategory, params: DbscanParams) -> Self {
        Self {
            category,
            params,
            partitions: Vec::new(),
            whitelisted_clusters: 0,
            errors: Vec::new(),
        }
    }

    pub fn clusters_built(&self) -> usize {
        self.partitions.iter().map(|p| p.clusters).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteringReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub categories: Vec<CategoryReport>,
}

impl ClusteringReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            categories: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn category(&self, category: SampleCategory) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &PartitionReport> {
        self.categories.iter().flat_map(|c| c.partitions.iter())
    }

    pub fn total_clusters(&self) -> usize {
        self.categories.iter().map(CategoryReport::clusters_built).sum()
    }

    pub fn failed_partitions(&self) -> usize {
        self.partitions()
            .filter(|p| matches!(p.outcome, PartitionOutcome::Failed { .. }))
            .count()
    }
}

impl fmt::Display for ClusteringReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- CLUSTERING DATABASE --- (run {})", self.run_id)?;
        writeln!(f, "Start time: {}", self.started_at.to_rfc3339())?;

        for category in &self.categories {
            writeln!(f)?;
            writeln!(f, "Clustering {}", category.category.table())?;
            writeln!(
                f,
                "DBSCAN params: radius: {} - minDensity: {}",
                category.params.epsilon, category.params.min_points
            )?;
            for partition in &category.partitions {
                write!(
                    f,
                    "  {} - {}: ",
                    partition.key.segment_key, partition.key.tag_name
                )?;
                match &partition.outcome {
                    PartitionOutcome::Clustered => writeln!(
                        f,
                        "processed {} hashes ({} invalid), clusters built: {}, noise: {}",
                        partition.samples,
                        partition.invalid_digests,
                        partition.clusters,
                        partition.noise
                    )?,
                    PartitionOutcome::TooSmall => writeln!(
                        f,
                        "skipped, {} hashes below minDensity",
                        partition.samples - partition.invalid_digests
                    )?,
                    PartitionOutcome::Skipped => writeln!(f, "not started")?,
                    PartitionOutcome::Failed { error } => writeln!(f, "failed: {error}")?,
                }
            }
            writeln!(
                f,
                "Whitelisted clusters: {}",
                category.whitelisted_clusters
            )?;
            for error in &category.errors {
                writeln!(f, "Error: {error}")?;
            }
            writeln!(f, "End clustering {}", category.category.table())?;
        }

        if let Some(finished_at) = self.finished_at {
            writeln!(f)?;
            writeln!(f, "End time: {}", finished_at.to_rfc3339())?;
            let elapsed = finished_at - self.started_at;
            writeln!(
                f,
                "Execution time (sec): {:.3}",
                elapsed.num_milliseconds() as f64 / 1000.0
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPrune {
    pub category: SampleCategory,
    pub cluster_name: String,
    pub members_before: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetGroupPrune {
    pub host: String,
    pub path: String,
    pub kept_id: i64,
    pub kept_version: String,
    pub deleted_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanSweep {
    pub table: String,
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub clusters: Vec<ClusterPrune>,
    pub asset_groups: Vec<AssetGroupPrune>,
    pub orphans: Vec<OrphanSweep>,
    pub errors: Vec<String>,
}

impl RetentionReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            clusters: Vec::new(),
            asset_groups: Vec::new(),
            orphans: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn samples_deleted(&self) -> usize {
        self.clusters.iter().map(|c| c.deleted).sum()
    }

    pub fn assets_deleted(&self) -> usize {
        self.asset_groups.iter().map(|g| g.deleted_ids.len()).sum()
    }

    pub fn orphans_deleted(&self) -> usize {
        self.orphans.iter().map(|o| o.deleted).sum()
    }
}

impl fmt::Display for RetentionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- PRUNING DATABASE --- (run {})", self.run_id)?;

        writeln!(f, "Pruning big clusters")?;
        for cluster in &self.clusters {
            writeln!(
                f,
                "  Deleted {} of {} scripts from cluster {} in {}",
                cluster.deleted,
                cluster.members_before,
                cluster.cluster_name,
                cluster.category.table()
            )?;
        }

        writeln!(f, "Pruning old external assets")?;
        for group in &self.asset_groups {
            writeln!(
                f,
                "  Kept {}{} (ver {}), deleted {} older",
                group.host,
                group.path,
                group.kept_version,
                group.deleted_ids.len()
            )?;
        }

        writeln!(f, "Deleting orphaned occurrences")?;
        for sweep in &self.orphans {
            writeln!(
                f,
                "  Deleted {} orphaned occurrences linked to {}",
                sweep.deleted, sweep.table
            )?;
        }

        for error in &self.errors {
            writeln!(f, "Error: {error}")?;
        }
        Ok(())
    }
}
