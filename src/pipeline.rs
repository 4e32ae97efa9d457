//! One full maintenance pass: cluster, then optionally prune.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::clustering::ClusteringEngine;
use crate::config::EngineConfig;
use crate::db::models::SampleCategory;
use crate::errors::EngineResult;
use crate::report::{ClusteringReport, RetentionReport};
use crate::retention::RetentionPruner;
use crate::store::{ClusterStore, RetentionStore};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub clustering: ClusteringReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionReport>,
    /// Clusters whitelisted by the propagation pass that follows pruning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelisted_after_prune: Option<usize>,
}

/// Cluster every partition and, with `prune`, apply the retention policies
/// and spread whitelist trust again over what is left.
pub async fn run_pipeline<S>(
    store: Arc<S>,
    config: EngineConfig,
    cancel: CancellationToken,
    prune: bool,
) -> EngineResult<RunOutput>
where
    S: ClusterStore + RetentionStore,
{
    let engine = ClusteringEngine::new(Arc::clone(&store), config.clone())?;
    let clustering = engine.run(cancel).await?;
    log_info!("\n{clustering}");

    if !prune {
        return Ok(RunOutput {
            clustering,
            retention: None,
            whitelisted_after_prune: None,
        });
    }

    let pruner = RetentionPruner::new(store, config)?;
    let retention = pruner.run().await;
    log_info!("\n{retention}");

    let mut whitelisted = 0;
    for category in SampleCategory::ALL {
        whitelisted += engine.propagate_whitelist(category).await?;
    }

    Ok(RunOutput {
        clustering,
        retention: Some(retention),
        whitelisted_after_prune: Some(whitelisted),
    })
}
