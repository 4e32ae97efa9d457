//! Near-duplicate clustering and retention for CSP violation script samples.
//!
//! Samples carry a 256-bit locality-sensitive digest. [`clustering`] groups
//! samples of each partition with DBSCAN under Hamming distance, names the
//! clusters and spreads whitelist flags across them. [`retention`] keeps the
//! store bounded afterwards.

mod utils;

pub mod clustering;
pub mod config;
pub mod db;
pub mod digest;
pub mod errors;
pub mod index;
pub mod pipeline;
pub mod report;
pub mod retention;
pub mod store;

pub use clustering::{ClusterNameAllocator, ClusteringEngine};
pub use config::{DbscanParams, EngineConfig};
pub use db::models::{PartitionKey, Sample, SampleCategory, UNCLUSTERED};
pub use db::Database;
pub use digest::Digest;
pub use errors::{EngineError, EngineResult};
pub use pipeline::{run_pipeline, RunOutput};
pub use report::{ClusteringReport, RetentionReport};
pub use retention::RetentionPruner;

/// Install the global logger at `info`; module directives in `RUST_LOG`
/// still apply.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
