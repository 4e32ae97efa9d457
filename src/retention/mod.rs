//! Retention policies applied after clustering.
//!
//! Three independent passes keep the store bounded:
//! capping cluster sizes, dropping superseded external asset versions and
//! sweeping occurrences left behind by either.

pub mod asset_versions;
pub mod cluster_cap;
pub mod orphans;
pub mod version_order;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::models::SampleCategory;
use crate::errors::EngineResult;
use crate::report::{AssetGroupPrune, ClusterPrune, OrphanSweep, RetentionReport};
use crate::store::RetentionStore;

pub use asset_versions::{plan_asset_pruning, prune_external_assets, AssetGroupPlan};
pub use cluster_cap::{prune_big_clusters, select_evictions};
pub use orphans::{sweep_orphaned_occurrences, OCCURRENCE_TARGETS};
pub use version_order::{compare_asset_versions, compare_loose_versions};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

pub struct RetentionPruner<S: RetentionStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: RetentionStore> RetentionPruner<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Run every policy in order: cluster cap, asset versions, orphans.
    ///
    /// A failing policy is recorded in the report and the next one still
    /// runs, so orphans created by a partial cap are swept anyway.
    pub async fn run(&self) -> RetentionReport {
        let mut report = RetentionReport::start();

        for category in SampleCategory::ALL {
            if let Err(err) = self.prune_clusters(category, &mut report.clusters).await {
                log_error!("cluster cap failed for {}: {err:?}", category.table());
                report
                    .errors
                    .push(format!("cluster cap on {}: {err}", category.table()));
            }
        }

        if let Err(err) = self.prune_assets(&mut report.asset_groups).await {
            log_error!("external asset pruning failed: {err:?}");
            report.errors.push(format!("external assets: {err}"));
        }

        if let Err(err) = self.sweep_orphans(&mut report.orphans).await {
            log_error!("orphan sweep failed: {err:?}");
            report.errors.push(format!("orphaned occurrences: {err}"));
        }

        report.finish();
        log_info!(
            "retention run {} deleted {} samples, {} assets, {} occurrences",
            report.run_id,
            report.samples_deleted(),
            report.assets_deleted(),
            report.orphans_deleted()
        );
        report
    }

    /// Cap every cluster of `category`, appending a record per trimmed
    /// cluster to `pruned` even when a later delete fails.
    pub async fn prune_clusters(
        &self,
        category: SampleCategory,
        pruned: &mut Vec<ClusterPrune>,
    ) -> EngineResult<()> {
        Ok(prune_big_clusters(
            self.store.as_ref(),
            category,
            self.config.cluster_limit,
            self.config.cap_unclustered,
            pruned,
        )
        .await?)
    }

    pub async fn prune_assets(&self, pruned: &mut Vec<AssetGroupPrune>) -> EngineResult<()> {
        Ok(prune_external_assets(self.store.as_ref(), pruned).await?)
    }

    pub async fn sweep_orphans(&self, sweeps: &mut Vec<OrphanSweep>) -> EngineResult<()> {
        Ok(sweep_orphaned_occurrences(self.store.as_ref(), sweeps).await?)
    }
}
