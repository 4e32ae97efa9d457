use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::parse_datetime,
    models::{PartitionKey, Sample, SampleCategory, UNCLUSTERED},
    Database,
};
use crate::store::ClusterStore;

/// A captured sample as handed over by the violation capture side.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub segment_key: String,
    pub tag_name: String,
    pub digest: String,
    pub whitelist: bool,
    pub last_seen: DateTime<Utc>,
}

impl NewSample {
    pub fn new(
        segment_key: impl Into<String>,
        tag_name: impl Into<String>,
        digest: impl Into<String>,
        last_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            segment_key: segment_key.into(),
            tag_name: tag_name.into(),
            digest: digest.into(),
            whitelist: false,
            last_seen,
        }
    }

    pub fn whitelisted(mut self, whitelist: bool) -> Self {
        self.whitelist = whitelist;
        self
    }
}

const SAMPLE_COLUMNS: &str =
    "id, segment_key, tag_name, digest, cluster_name, whitelist, last_seen, occurrence_count";

fn row_to_sample(row: &Row, category: SampleCategory) -> Result<Sample> {
    let last_seen: String = row.get("last_seen")?;

    Ok(Sample {
        id: row.get("id")?,
        category,
        segment_key: row.get("segment_key")?,
        tag_name: row.get("tag_name")?,
        digest: row.get("digest")?,
        cluster_name: row.get("cluster_name")?,
        whitelist: row.get("whitelist")?,
        last_seen: parse_datetime(&last_seen, "last_seen")?,
        occurrence_count: row.get("occurrence_count")?,
    })
}

impl Database {
    pub async fn insert_sample(&self, category: SampleCategory, sample: &NewSample) -> Result<i64> {
        let record = sample.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (segment_key, tag_name, digest, whitelist, last_seen)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    category.table()
                ),
                params![
                    record.segment_key,
                    record.tag_name,
                    record.digest,
                    record.whitelist,
                    record.last_seen.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert sample into {}", category.table()))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_sample(&self, category: SampleCategory, sample_id: i64) -> Result<Option<Sample>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SAMPLE_COLUMNS} FROM {} WHERE id = ?1",
                category.table()
            ))?;
            let mut rows = stmt.query(params![sample_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_sample(row, category)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn count_samples(&self, category: SampleCategory) -> Result<usize> {
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", category.table()),
                [],
                |row| row.get(0),
            )?;
            crate::db::helpers::to_usize(count, "count")
        })
        .await
    }
}

#[async_trait]
impl ClusterStore for Database {
    async fn partitions(&self, category: SampleCategory) -> Result<Vec<PartitionKey>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT segment_key, tag_name FROM {}
                 ORDER BY segment_key ASC, tag_name ASC",
                category.table()
            ))?;

            let mut rows = stmt.query([])?;
            let mut keys = Vec::new();
            while let Some(row) = rows.next()? {
                keys.push(PartitionKey::new(
                    category,
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ));
            }
            Ok(keys)
        })
        .await
    }

    async fn partition_samples(&self, key: &PartitionKey) -> Result<Vec<Sample>> {
        let key = key.clone();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SAMPLE_COLUMNS} FROM {}
                 WHERE segment_key = ?1 AND tag_name = ?2
                 ORDER BY id ASC",
                key.category.table()
            ))?;

            let mut rows = stmt.query(params![key.segment_key, key.tag_name])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row, key.category)?);
            }
            Ok(samples)
        })
        .await
    }

    async fn existing_cluster_names(&self) -> Result<HashSet<String>> {
        self.execute(|conn| {
            let mut names = HashSet::new();
            for category in SampleCategory::ALL {
                let mut stmt = conn.prepare(&format!(
                    "SELECT DISTINCT cluster_name FROM {}",
                    category.table()
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    names.insert(row.get::<_, String>(0)?);
                }
            }
            Ok(names)
        })
        .await
    }

    async fn assign_clusters(
        &self,
        category: SampleCategory,
        assignments: Vec<(i64, String)>,
    ) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "UPDATE {} SET cluster_name = ?1 WHERE id = ?2",
                    category.table()
                ))?;
                for (sample_id, cluster_name) in &assignments {
                    stmt.execute(params![cluster_name, sample_id])
                        .with_context(|| format!("failed to label sample {sample_id}"))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn clusters_in(&self, category: SampleCategory) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT cluster_name FROM {}
                 WHERE cluster_name != ?1
                 ORDER BY cluster_name ASC",
                category.table()
            ))?;
            let mut rows = stmt.query(params![UNCLUSTERED])?;
            let mut names = Vec::new();
            while let Some(row) = rows.next()? {
                names.push(row.get::<_, String>(0)?);
            }
            Ok(names)
        })
        .await
    }

    async fn max_whitelist_in_cluster(
        &self,
        category: SampleCategory,
        cluster_name: &str,
    ) -> Result<bool> {
        let cluster_name = cluster_name.to_string();
        self.execute(move |conn| {
            let max: i64 = conn.query_row(
                &format!(
                    "SELECT COALESCE(MAX(whitelist), 0) FROM {} WHERE cluster_name = ?1",
                    category.table()
                ),
                params![cluster_name],
                |row| row.get(0),
            )?;
            Ok(max != 0)
        })
        .await
    }

    async fn set_cluster_whitelist(
        &self,
        category: SampleCategory,
        cluster_name: &str,
        whitelist: bool,
    ) -> Result<usize> {
        let cluster_name = cluster_name.to_string();
        self.execute(move |conn| {
            let touched = conn
                .execute(
                    &format!(
                        "UPDATE {} SET whitelist = ?1 WHERE cluster_name = ?2",
                        category.table()
                    ),
                    params![whitelist, cluster_name],
                )
                .with_context(|| format!("failed to update whitelist of {cluster_name}"))?;
            Ok(touched)
        })
        .await
    }

    async fn uncluster_sample(&self, category: SampleCategory, sample_id: i64) -> Result<usize> {
        self.execute(move |conn| {
            let touched = conn.execute(
                &format!(
                    "UPDATE {} SET cluster_name = ?1 WHERE id = ?2",
                    category.table()
                ),
                params![UNCLUSTERED, sample_id],
            )?;
            Ok(touched)
        })
        .await
    }
}
