use std::sync::Arc;

use anyhow::anyhow;
use rand::Rng;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::clustering::dbscan::dbscan_with_leaf_size;
use crate::clustering::names::ClusterNameAllocator;
use crate::clustering::whitelist::propagate_whitelist;
use crate::config::{DbscanParams, EngineConfig};
use crate::db::models::{PartitionKey, SampleCategory};
use crate::digest::Digest;
use crate::errors::{EngineError, EngineResult};
use crate::report::{CategoryReport, ClusteringReport, PartitionOutcome, PartitionReport};
use crate::store::ClusterStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

type SharedAllocator<R> = Arc<Mutex<ClusterNameAllocator<R>>>;

/// Drives a clustering run over every partition of both sample categories.
pub struct ClusteringEngine<S: ClusterStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: ClusterStore> ClusteringEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Cluster everything with a fresh random name allocator.
    pub async fn run(&self, cancel: CancellationToken) -> EngineResult<ClusteringReport> {
        let existing = self.store.existing_cluster_names().await?;
        let allocator = ClusterNameAllocator::from_entropy(existing, self.config.name_attempts);
        self.run_with_allocator(allocator, cancel).await
    }

    /// Cluster everything using the given allocator.
    ///
    /// Partitions that have not started when `cancel` fires or the configured
    /// time limit passes are reported as skipped; finished partitions keep
    /// their new labels. Running out of cluster names aborts the run with
    /// `EngineError::NameSpaceExhausted`.
    pub async fn run_with_allocator<R>(
        &self,
        allocator: ClusterNameAllocator<R>,
        cancel: CancellationToken,
    ) -> EngineResult<ClusteringReport>
    where
        R: Rng + Send + 'static,
    {
        let mut report = ClusteringReport::start();
        let deadline = self
            .config
            .time_limit_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let stop = cancel.child_token();
        let allocator = Arc::new(Mutex::new(allocator));

        for category in SampleCategory::ALL {
            let category_report = self
                .cluster_category(category, Arc::clone(&allocator), &stop, deadline)
                .await;
            report.categories.push(category_report?);
        }

        report.finish();
        log_info!(
            "clustering run {} built {} clusters ({} partitions failed)",
            report.run_id,
            report.total_clusters(),
            report.failed_partitions()
        );
        Ok(report)
    }

    /// Reset one sample to `Unclustered`.
    pub async fn uncluster(&self, category: SampleCategory, sample_id: i64) -> EngineResult<bool> {
        let touched = self.store.uncluster_sample(category, sample_id).await?;
        Ok(touched > 0)
    }

    /// Re-run whitelist propagation, e.g. after retention removed members.
    pub async fn propagate_whitelist(&self, category: SampleCategory) -> EngineResult<usize> {
        Ok(propagate_whitelist(self.store.as_ref(), category).await?)
    }

    async fn cluster_category<R>(
        &self,
        category: SampleCategory,
        allocator: SharedAllocator<R>,
        stop: &CancellationToken,
        deadline: Option<Instant>,
    ) -> EngineResult<CategoryReport>
    where
        R: Rng + Send + 'static,
    {
        let params = self.config.params_for(category);
        params.validate()?;
        let mut report = CategoryReport::new(category, params);

        log_info!(
            "Clustering {} (radius {}, minDensity {})",
            category.table(),
            params.epsilon,
            params.min_points
        );

        let keys = match self.store.partitions(category).await {
            Ok(keys) => keys,
            Err(err) => {
                log_error!("failed to enumerate partitions of {}: {err:?}", category.table());
                report.errors.push(format!("{err:#}"));
                return Ok(report);
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_partitions));
        let mut tasks = JoinSet::new();
        let mut finished: Vec<(usize, PartitionReport)> = Vec::with_capacity(keys.len());

        for (position, key) in keys.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|err| anyhow!("partition semaphore closed: {err}"))?;

            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if stop.is_cancelled() || expired {
                finished.push((position, PartitionReport::empty(key, PartitionOutcome::Skipped)));
                continue;
            }

            let store = Arc::clone(&self.store);
            let allocator = Arc::clone(&allocator);
            let stop = stop.clone();
            let leaf_size = self.config.leaf_size;

            tasks.spawn(async move {
                let _permit = permit;
                let result =
                    cluster_partition(store.as_ref(), &key, params, leaf_size, &allocator).await;
                if matches!(result, Err(EngineError::NameSpaceExhausted { .. })) {
                    stop.cancel();
                }
                (position, key, result)
            });
        }

        let mut exhausted: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Ok(partition))) => finished.push((position, partition)),
                Ok((_, key, Err(err @ EngineError::NameSpaceExhausted { .. }))) => {
                    log_error!(
                        "cluster names exhausted in {} / {}: {err}",
                        key.segment_key,
                        key.tag_name
                    );
                    exhausted = Some(err);
                }
                Ok((position, key, Err(err))) => {
                    log_error!(
                        "partition {} / {} of {} failed: {err}",
                        key.segment_key,
                        key.tag_name,
                        category.table()
                    );
                    let error = err.to_string();
                    finished.push((
                        position,
                        PartitionReport::empty(key, PartitionOutcome::Failed { error }),
                    ));
                }
                Err(join_err) => {
                    log_error!("partition task aborted: {join_err}");
                    report.errors.push(format!("partition task aborted: {join_err}"));
                }
            }
        }

        // Committed partitions must not be left with mixed trust, even when
        // the run is about to abort.
        let propagated = propagate_whitelist(self.store.as_ref(), category).await;

        if let Some(err) = exhausted {
            if let Err(propagation_err) = propagated {
                log_error!(
                    "whitelist propagation failed for {}: {propagation_err:?}",
                    category.table()
                );
            }
            return Err(err);
        }

        finished.sort_by_key(|(position, _)| *position);
        report.partitions = finished.into_iter().map(|(_, partition)| partition).collect();

        match propagated {
            Ok(count) => report.whitelisted_clusters = count,
            Err(err) => {
                log_error!("whitelist propagation failed for {}: {err:?}", category.table());
                report.errors.push(format!("whitelist propagation: {err:#}"));
            }
        }

        log_info!(
            "Performed clustering on {}: {} clusters",
            category.table(),
            report.clusters_built()
        );
        Ok(report)
    }
}

/// Read, decode, cluster, name and write back one partition.
async fn cluster_partition<S, R>(
    store: &S,
    key: &PartitionKey,
    params: DbscanParams,
    leaf_size: usize,
    allocator: &Mutex<ClusterNameAllocator<R>>,
) -> EngineResult<PartitionReport>
where
    S: ClusterStore + ?Sized,
    R: Rng + Send,
{
    let samples = store.partition_samples(key).await?;

    let mut ids = Vec::with_capacity(samples.len());
    let mut digests = Vec::with_capacity(samples.len());
    let mut invalid_digests = 0;
    for sample in &samples {
        match Digest::parse(&sample.digest) {
            Ok(digest) => {
                ids.push(sample.id);
                digests.push(digest);
            }
            Err(err) => {
                invalid_digests += 1;
                log_warn!(
                    "skipping sample {} in {}: {err}",
                    sample.id,
                    key.category.table()
                );
            }
        }
    }

    let mut report = PartitionReport::empty(key.clone(), PartitionOutcome::TooSmall);
    report.samples = samples.len();
    report.invalid_digests = invalid_digests;

    if digests.len() < params.min_points {
        return Ok(report);
    }

    let clustering =
        tokio::task::spawn_blocking(move || dbscan_with_leaf_size(&digests, &params, leaf_size))
            .await
            .map_err(|err| anyhow!("clustering task failed: {err}"))?;

    let names = allocator.lock().await.names_for(&clustering.labels)?;
    let assignments: Vec<(i64, String)> = ids.into_iter().zip(names).collect();
    store.assign_clusters(key.category, assignments).await?;

    log_info!(
        "{} - {}: processed {} hashes, clusters built: {}",
        key.segment_key,
        key.tag_name,
        samples.len(),
        clustering.cluster_count
    );

    report.clusters = clustering.cluster_count;
    report.noise = clustering.noise_count;
    report.outcome = PartitionOutcome::Clustered;
    Ok(report)
}
