use serde::{Deserialize, Serialize};
use url::Url;

pub const EXTERNAL_ASSETS_TABLE: &str = "external_assets";

/// An external script recorded by its `src` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAsset {
    pub id: i64,
    pub src_attrib: String,
}

/// Parsed `(host, path)` identity plus the `ver` query value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetIdentity {
    pub host: String,
    pub path: String,
    pub version: String,
}

impl ExternalAsset {
    pub fn new(id: i64, src_attrib: impl Into<String>) -> Self {
        Self {
            id,
            src_attrib: src_attrib.into(),
        }
    }

    /// `None` when the URL does not parse, has no host, or carries no
    /// non-empty `ver` parameter. Such assets never take part in version
    /// de-duplication.
    pub fn identity(&self) -> Option<AssetIdentity> {
        let url = Url::parse(&self.src_attrib).ok()?;
        let host = url.host_str()?.to_string();
        let version = url
            .query_pairs()
            .find(|(key, _)| *key == "ver")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())?;

        Some(AssetIdentity {
            host,
            path: url.path().to_string(),
            version,
        })
    }
}
