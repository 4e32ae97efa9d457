use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;

use crate::db::models::ExternalAsset;
use crate::report::AssetGroupPrune;
use crate::retention::version_order::compare_asset_versions;
use crate::store::RetentionStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// What to keep and delete for one `(host, path)` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetGroupPlan {
    pub host: String,
    pub path: String,
    pub kept_id: i64,
    pub kept_version: String,
    pub delete_ids: Vec<i64>,
}

/// Group assets by host and path and keep only the newest `ver` in each.
///
/// Assets without a usable identity are left out entirely. Groups come back
/// in the order their first member was seen. When two versions compare
/// equal the earlier asset is kept.
pub fn plan_asset_pruning(assets: &[ExternalAsset]) -> Vec<AssetGroupPlan> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<((String, String), Vec<(i64, String)>)> = Vec::new();

    for asset in assets {
        let Some(identity) = asset.identity() else {
            log_debug!("asset {} has no host/path/ver identity", asset.id);
            continue;
        };
        let key = (identity.host, identity.path);
        let slot = *positions.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((asset.id, identity.version));
    }

    groups
        .into_iter()
        .filter_map(|((host, path), members)| {
            // linear scan: the ordering is not guaranteed transitive on mixed input
            let (kept_id, kept_version) = members
                .iter()
                .skip(1)
                .fold(members.first()?, |newest, candidate| {
                    if compare_asset_versions(&candidate.1, &newest.1) == Ordering::Greater {
                        candidate
                    } else {
                        newest
                    }
                })
                .clone();

            let delete_ids = members
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| *id != kept_id)
                .collect();

            Some(AssetGroupPlan {
                host,
                path,
                kept_id,
                kept_version,
                delete_ids,
            })
        })
        .collect()
}

/// Delete every superseded external asset version.
///
/// Groups with a single member are not reported. When a delete fails, the
/// group's record still lists the assets removed so far.
pub async fn prune_external_assets<S>(store: &S, pruned: &mut Vec<AssetGroupPrune>) -> Result<()>
where
    S: RetentionStore + ?Sized,
{
    let assets = store.external_assets().await?;

    for plan in plan_asset_pruning(&assets) {
        if plan.delete_ids.is_empty() {
            continue;
        }

        let mut deleted_ids = Vec::with_capacity(plan.delete_ids.len());
        let mut failure = None;
        for asset_id in plan.delete_ids {
            match store.delete_external_asset(asset_id).await {
                Ok(0) => {}
                Ok(_) => deleted_ids.push(asset_id),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        log_info!(
            "Kept {}{} ver {}, deleted {} older versions",
            plan.host,
            plan.path,
            plan.kept_version,
            deleted_ids.len()
        );
        pruned.push(AssetGroupPrune {
            host: plan.host,
            path: plan.path,
            kept_id: plan.kept_id,
            kept_version: plan.kept_version,
            deleted_ids,
        });

        if let Some(err) = failure {
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: i64, src: &str) -> ExternalAsset {
        ExternalAsset::new(id, src)
    }

    #[test]
    fn keeps_newest_version_per_path() {
        let assets = vec![
            asset(1, "https://example.org/app.js?ver=1.0.0"),
            asset(2, "https://example.org/app.js?ver=1.2.0"),
            asset(3, "https://example.org/app.js?ver=0.9.0"),
        ];

        let plans = plan_asset_pruning(&assets);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kept_id, 2);
        assert_eq!(plans[0].kept_version, "1.2.0");
        assert_eq!(plans[0].delete_ids, vec![1, 3]);
    }

    #[test]
    fn hosts_and_paths_form_separate_groups() {
        let assets = vec![
            asset(1, "https://cdn.example.org/lib.js?ver=2"),
            asset(2, "https://example.org/lib.js?ver=1"),
            asset(3, "https://example.org/other.js?ver=1"),
            asset(4, "https://cdn.example.org/lib.js?ver=3"),
        ];

        let plans = plan_asset_pruning(&assets);
        let summary: Vec<(&str, &str, i64)> = plans
            .iter()
            .map(|p| (p.host.as_str(), p.path.as_str(), p.kept_id))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("cdn.example.org", "/lib.js", 4),
                ("example.org", "/lib.js", 2),
                ("example.org", "/other.js", 3),
            ]
        );
        assert_eq!(plans[0].delete_ids, vec![1]);
        assert!(plans[1].delete_ids.is_empty());
    }

    #[test]
    fn assets_without_identity_are_untouched() {
        let assets = vec![
            asset(1, "https://example.org/app.js"),
            asset(2, "/relative/app.js?ver=1.0"),
            asset(3, "https://example.org/app.js?ver=1.0"),
        ];

        let plans = plan_asset_pruning(&assets);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kept_id, 3);
        assert!(plans[0].delete_ids.is_empty());
    }

    #[test]
    fn equal_versions_keep_the_first_asset() {
        let assets = vec![
            asset(10, "https://example.org/app.js?ver=1.0"),
            asset(11, "https://example.org/app.js?ver=01.0"),
            asset(12, "https://example.org/app.js?ver=1.0"),
        ];

        let plans = plan_asset_pruning(&assets);
        assert_eq!(plans[0].kept_id, 10);
        assert_eq!(plans[0].delete_ids, vec![11, 12]);
    }
}
