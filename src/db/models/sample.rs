//! Script sample data models.
//!
//! Samples are written by the violation capture side; this crate only reads
//! them and updates `cluster_name` and `whitelist`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved cluster name shared by every noise sample.
pub const UNCLUSTERED: &str = "Unclustered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleCategory {
    /// Inline `<script>` bodies, segmented by CSP directive.
    Inline,
    /// Inline event handler attributes, segmented by event attribute.
    Event,
}

impl SampleCategory {
    pub const ALL: [SampleCategory; 2] = [SampleCategory::Inline, SampleCategory::Event];

    pub const fn table(&self) -> &'static str {
        match self {
            SampleCategory::Inline => "inline_scripts",
            SampleCategory::Event => "event_handlers",
        }
    }
}

/// Identifies one partition: samples are only compared within a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub category: SampleCategory,
    pub segment_key: String,
    pub tag_name: String,
}

impl PartitionKey {
    pub fn new(
        category: SampleCategory,
        segment_key: impl Into<String>,
        tag_name: impl Into<String>,
    ) -> Self {
        Self {
            category,
            segment_key: segment_key.into(),
            tag_name: tag_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: i64,
    pub category: SampleCategory,
    pub segment_key: String,
    pub tag_name: String,
    pub digest: String,
    pub cluster_name: String,
    pub whitelist: bool,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: i64,
}

/// The slice of a sample the cluster cap needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMember {
    pub id: i64,
    pub last_seen: DateTime<Utc>,
}
