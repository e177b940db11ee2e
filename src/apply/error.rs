use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to parse manifest document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("document has no apiVersion/kind")]
    MissingTypes,

    #[error("invalid apiVersion: {0}")]
    InvalidGroupVersion(String),

    #[error("document has no metadata.name")]
    MissingName,

    #[error("no REST mapping for {0}")]
    UnknownKind(String),

    #[error("cluster API error: {0}")]
    Cluster(#[from] kube::Error),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk manifest directory: {0}")]
    Walk(#[from] walkdir::Error),
}
