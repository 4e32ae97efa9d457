use anyhow::Result;

use crate::db::models::{SampleCategory, EXTERNAL_ASSETS_TABLE};
use crate::report::OrphanSweep;
use crate::store::RetentionStore;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Tables an occurrence row can point into.
pub const OCCURRENCE_TARGETS: [&str; 3] = [
    SampleCategory::Inline.table(),
    SampleCategory::Event.table(),
    EXTERNAL_ASSETS_TABLE,
];

/// Delete occurrences whose target row no longer exists, appending one
/// record per swept table to `sweeps`.
pub async fn sweep_orphaned_occurrences<S>(store: &S, sweeps: &mut Vec<OrphanSweep>) -> Result<()>
where
    S: RetentionStore + ?Sized,
{
    for table in OCCURRENCE_TARGETS {
        let mut deleted = 0;
        let mut failure = None;
        for occurrence_id in store.orphaned_occurrences(table).await? {
            match store.delete_occurrence(occurrence_id).await {
                Ok(rows) => deleted += rows,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        log_info!("Deleted {deleted} orphaned occurrences linked to {table}");
        sweeps.push(OrphanSweep {
            table: table.to_string(),
            deleted,
        });

        if let Some(err) = failure {
            return Err(err);
        }
    }

    Ok(())
}
