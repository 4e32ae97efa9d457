pub mod external_asset;
pub mod sample;

pub use external_asset::{AssetIdentity, ExternalAsset, EXTERNAL_ASSETS_TABLE};
pub use sample::{ClusterMember, PartitionKey, Sample, SampleCategory, UNCLUSTERED};
