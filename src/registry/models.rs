use serde::Deserialize;
use std::collections::HashMap;

/// A tag observation: the human-readable name, the canonical content digest
/// reported by the registry, and the manifest annotations. Annotations are
/// informational only and never feed an authorization decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub digest: String,
    pub annotations: HashMap<String, String>,
}

/// Response body of `GET /v2/{repo}/tags/list`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagList {
    #[allow(dead_code)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The subset of an OCI image manifest the agent reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageManifest {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub layers: Vec<ManifestLayer>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestLayer {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}
