//! Partition clustering: DBSCAN over digests, cluster naming and whitelist
//! propagation.

pub mod dbscan;
pub mod engine;
pub mod names;
pub mod whitelist;

pub use dbscan::{dbscan, Label, PartitionClustering};
pub use engine::ClusteringEngine;
pub use names::ClusterNameAllocator;
pub use whitelist::propagate_whitelist;
