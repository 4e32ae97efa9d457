use anyhow::Result;

use crate::db::models::SampleCategory;
use crate::store::ClusterStore;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Make every cluster in `category` as trusted as its most trusted member.
///
/// The flag only ever spreads: a cluster containing one whitelisted sample
/// becomes fully whitelisted, and removing that sample later does not revert
/// the others. `Unclustered` samples keep their own flags. Returns the number
/// of clusters that ended up whitelisted.
pub async fn propagate_whitelist<S>(store: &S, category: SampleCategory) -> Result<usize>
where
    S: ClusterStore + ?Sized,
{
    let clusters = store.clusters_in(category).await?;
    let mut whitelisted = 0;

    for cluster_name in &clusters {
        let trusted = store.max_whitelist_in_cluster(category, cluster_name).await?;
        let touched = store
            .set_cluster_whitelist(category, cluster_name, trusted)
            .await?;
        if trusted {
            whitelisted += 1;
            log_debug!(
                "whitelisted {touched} members of {cluster_name} in {}",
                category.table()
            );
        }
    }

    Ok(whitelisted)
}
