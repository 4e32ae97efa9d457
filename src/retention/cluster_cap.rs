use anyhow::Result;

use crate::db::models::{ClusterMember, SampleCategory, UNCLUSTERED};
use crate::report::ClusterPrune;
use crate::store::RetentionStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Ids to delete so that at most `limit` members remain.
///
/// The oldest `last_seen` goes first; equal timestamps fall back to the
/// lower id so the choice is stable between runs.
pub fn select_evictions(members: &[ClusterMember], limit: usize) -> Vec<i64> {
    if members.len() <= limit {
        return Vec::new();
    }

    let mut ordered: Vec<&ClusterMember> = members.iter().collect();
    ordered.sort_by(|a, b| a.last_seen.cmp(&b.last_seen).then(a.id.cmp(&b.id)));
    ordered
        .into_iter()
        .take(members.len() - limit)
        .map(|member| member.id)
        .collect()
}

/// Trim every over-sized cluster of `category` down to `limit` members.
///
/// One record per trimmed cluster is appended to `pruned`. When a delete
/// fails, the cluster's record still carries the rows removed so far.
pub async fn prune_big_clusters<S>(
    store: &S,
    category: SampleCategory,
    limit: usize,
    cap_unclustered: bool,
    pruned: &mut Vec<ClusterPrune>,
) -> Result<()>
where
    S: RetentionStore + ?Sized,
{
    for (cluster_name, _) in store.big_clusters(category, limit).await? {
        if !cap_unclustered && cluster_name == UNCLUSTERED {
            log_debug!("leaving {UNCLUSTERED} in {} uncapped", category.table());
            continue;
        }

        let members = store.cluster_members(category, &cluster_name).await?;
        let evictions = select_evictions(&members, limit);

        let mut deleted = 0;
        let mut failure = None;
        for sample_id in &evictions {
            match store.delete_sample(category, *sample_id).await {
                Ok(rows) => deleted += rows,
                Err(err) => {
                    failure = Some(err.context(format!(
                        "failed to evict sample {sample_id} from {cluster_name}"
                    )));
                    break;
                }
            }
        }

        log_info!(
            "Deleted {deleted} of {} scripts from cluster {cluster_name} in {}",
            members.len(),
            category.table()
        );
        pruned.push(ClusterPrune {
            category,
            cluster_name,
            members_before: members.len(),
            deleted,
        });

        if let Some(err) = failure {
            return Err(err);
        }
    }

    Ok(())
}
