use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::{
    helpers::{known_table, parse_datetime, to_usize},
    models::{ClusterMember, ExternalAsset, SampleCategory, EXTERNAL_ASSETS_TABLE},
    Database,
};
use crate::store::RetentionStore;

impl Database {
    pub async fn insert_external_asset(&self, src_attrib: &str) -> Result<i64> {
        let src_attrib = src_attrib.to_string();
        self.execute(move |conn| {
            conn.execute(
                &format!("INSERT INTO {EXTERNAL_ASSETS_TABLE} (src_attrib) VALUES (?1)"),
                params![src_attrib],
            )
            .with_context(|| "failed to insert external asset")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_occurrence(
        &self,
        table: &str,
        item_id: i64,
        page_url: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<i64> {
        let table = known_table(table)?;
        let page_url = page_url.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO occurrences (source_table, item_id, page_url, last_seen)
                 VALUES (?1, ?2, ?3, ?4)",
                params![table, item_id, page_url, last_seen.to_rfc3339()],
            )
            .with_context(|| "failed to insert occurrence")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn count_occurrences(&self) -> Result<usize> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM occurrences", [], |row| row.get(0))?;
            to_usize(count, "count")
        })
        .await
    }
}

#[async_trait]
impl RetentionStore for Database {
    async fn big_clusters(
        &self,
        category: SampleCategory,
        limit: usize,
    ) -> Result<Vec<(String, usize)>> {
        let limit = i64::try_from(limit).context("cluster limit exceeds SQLite INTEGER range")?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT cluster_name, COUNT(*) AS members FROM {}
                 GROUP BY cluster_name
                 HAVING COUNT(*) > ?1
                 ORDER BY cluster_name ASC",
                category.table()
            ))?;

            let mut rows = stmt.query(params![limit])?;
            let mut clusters = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let members = to_usize(row.get::<_, i64>(1)?, "members")?;
                clusters.push((name, members));
            }
            Ok(clusters)
        })
        .await
    }

    async fn cluster_members(
        &self,
        category: SampleCategory,
        cluster_name: &str,
    ) -> Result<Vec<ClusterMember>> {
        let cluster_name = cluster_name.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, last_seen FROM {} WHERE cluster_name = ?1 ORDER BY id ASC",
                category.table()
            ))?;

            let mut rows = stmt.query(params![cluster_name])?;
            let mut members = Vec::new();
            while let Some(row) = rows.next()? {
                let last_seen: String = row.get(1)?;
                members.push(ClusterMember {
                    id: row.get(0)?,
                    last_seen: parse_datetime(&last_seen, "last_seen")?,
                });
            }
            Ok(members)
        })
        .await
    }

    async fn delete_sample(&self, category: SampleCategory, sample_id: i64) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    &format!("DELETE FROM {} WHERE id = ?1", category.table()),
                    params![sample_id],
                )
                .with_context(|| format!("failed to delete sample {sample_id}"))?;
            Ok(deleted)
        })
        .await
    }

    async fn external_assets(&self) -> Result<Vec<ExternalAsset>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, src_attrib FROM {EXTERNAL_ASSETS_TABLE} ORDER BY id ASC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut assets = Vec::new();
            while let Some(row) = rows.next()? {
                assets.push(ExternalAsset {
                    id: row.get(0)?,
                    src_attrib: row.get(1)?,
                });
            }
            Ok(assets)
        })
        .await
    }

    async fn delete_external_asset(&self, asset_id: i64) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    &format!("DELETE FROM {EXTERNAL_ASSETS_TABLE} WHERE id = ?1"),
                    params![asset_id],
                )
                .with_context(|| format!("failed to delete external asset {asset_id}"))?;
            Ok(deleted)
        })
        .await
    }

    async fn orphaned_occurrences(&self, table: &'static str) -> Result<Vec<i64>> {
        let table = known_table(table)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT o.id FROM occurrences o
                 WHERE o.source_table = ?1
                   AND NOT EXISTS (SELECT 1 FROM {table} t WHERE t.id = o.item_id)
                 ORDER BY o.id ASC"
            ))?;
            let mut rows = stmt.query(params![table])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
        .await
    }

    async fn delete_occurrence(&self, occurrence_id: i64) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM occurrences WHERE id = ?1",
                params![occurrence_id],
            )?;
            Ok(deleted)
        })
        .await
    }
}
