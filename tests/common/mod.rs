#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use csp_cluster::{DbscanParams, EngineConfig};

/// Hex digest made of `ones` leading `f` nibbles and zeros elsewhere,
/// optionally with the last nibble replaced.
pub fn digest(ones: usize, tail: char) -> String {
    let mut hex = "f".repeat(ones);
    hex.push_str(&"0".repeat(63 - ones));
    hex.push(tail);
    hex
}

pub fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
}

/// Tight parameters so that only digests a few bits apart cluster.
pub fn tight_config() -> EngineConfig {
    EngineConfig {
        inline: DbscanParams::new(5, 2),
        event: DbscanParams::new(5, 2),
        max_parallel_partitions: 2,
        ..EngineConfig::default()
    }
}
