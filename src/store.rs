//! Persistence collaborators of the engine.
//!
//! The engine never talks to SQL directly; it reads partitions and writes
//! labels and deletions through these traits. [`crate::db::Database`] is the
//! SQLite implementation.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{ClusterMember, ExternalAsset, PartitionKey, Sample, SampleCategory};

#[async_trait]
pub trait ClusterStore: Send + Sync + 'static {
    /// Distinct `(segment_key, tag_name)` pairs present for a category.
    async fn partitions(&self, category: SampleCategory) -> Result<Vec<PartitionKey>>;

    /// Samples of one partition in stable retrieval order.
    async fn partition_samples(&self, key: &PartitionKey) -> Result<Vec<Sample>>;

    /// Every cluster name currently persisted in any category.
    async fn existing_cluster_names(&self) -> Result<HashSet<String>>;

    /// Write `(sample_id, cluster_name)` pairs for one category.
    async fn assign_clusters(
        &self,
        category: SampleCategory,
        assignments: Vec<(i64, String)>,
    ) -> Result<()>;

    /// Cluster names in a category, `Unclustered` excluded.
    async fn clusters_in(&self, category: SampleCategory) -> Result<Vec<String>>;

    async fn max_whitelist_in_cluster(
        &self,
        category: SampleCategory,
        cluster_name: &str,
    ) -> Result<bool>;

    /// Set the whitelist flag on every member; returns rows touched.
    async fn set_cluster_whitelist(
        &self,
        category: SampleCategory,
        cluster_name: &str,
        whitelist: bool,
    ) -> Result<usize>;

    /// Move one sample back to `Unclustered`, leaving its whitelist flag alone.
    async fn uncluster_sample(&self, category: SampleCategory, sample_id: i64) -> Result<usize>;
}

#[async_trait]
pub trait RetentionStore: Send + Sync + 'static {
    /// Clusters with more than `limit` members, with their member count.
    async fn big_clusters(
        &self,
        category: SampleCategory,
        limit: usize,
    ) -> Result<Vec<(String, usize)>>;

    async fn cluster_members(
        &self,
        category: SampleCategory,
        cluster_name: &str,
    ) -> Result<Vec<ClusterMember>>;

    async fn delete_sample(&self, category: SampleCategory, sample_id: i64) -> Result<usize>;

    async fn external_assets(&self) -> Result<Vec<ExternalAsset>>;

    async fn delete_external_asset(&self, asset_id: i64) -> Result<usize>;

    /// Occurrence ids whose target row in `table` no longer exists.
    async fn orphaned_occurrences(&self, table: &'static str) -> Result<Vec<i64>>;

    async fn delete_occurrence(&self, occurrence_id: i64) -> Result<usize>;
}
