use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed registry response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("missing Docker-Content-Digest header for {0}")]
    MissingDigest(String),
}

impl RegistryError {
    /// True when the registry answered 404 for the requested resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::Status { status: 404, .. })
    }
}
