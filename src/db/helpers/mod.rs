use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{SampleCategory, EXTERNAL_ASSETS_TABLE};

pub fn to_usize(value: i64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Guard for table names interpolated into SQL.
pub fn known_table(table: &str) -> Result<&'static str> {
    SampleCategory::ALL
        .iter()
        .map(SampleCategory::table)
        .chain(std::iter::once(EXTERNAL_ASSETS_TABLE))
        .find(|known| *known == table)
        .ok_or_else(|| anyhow!("unknown table {table}"))
}
