use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::registry::{RegistryClient, RegistryError, Tag};

/// Layer annotation naming the file a layer unpacks to, per the OCI
/// file-artifact convention.
const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("file store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("layer title {0:?} escapes the file store")]
    UnsafePath(String),
}

/// Copies a verified tag's content into the local file store. Each manifest
/// layer is pulled by digest and written under its title annotation; the
/// fetcher never interprets the content.
pub struct ArtifactFetcher {
    registry: RegistryClient,
    store_root: PathBuf,
}

impl ArtifactFetcher {
    pub fn new(registry: RegistryClient, store_root: PathBuf) -> Self {
        Self {
            registry,
            store_root,
        }
    }

    /// Pull the artifact behind `tag` into the store directory and return
    /// that directory.
    pub async fn pull(
        &self,
        registry_host: &str,
        repository: &str,
        tag: &Tag,
    ) -> Result<PathBuf, FetchError> {
        info!("⬇ Pulling tag '{}' into {}", tag.name, self.store_root.display());

        let manifest = self
            .registry
            .fetch_manifest(registry_host, repository, &tag.name)
            .await?;

        tokio::fs::create_dir_all(&self.store_root).await?;

        for layer in &manifest.layers {
            let Some(title) = layer.annotations.get(TITLE_ANNOTATION) else {
                debug!("Skipping untitled layer {}", layer.digest);
                continue;
            };

            let relative = Path::new(title);
            if !is_safe_relative(relative) {
                return Err(FetchError::UnsafePath(title.clone()));
            }

            let content = self
                .registry
                .fetch_blob(registry_host, repository, &layer.digest)
                .await?;

            let target = self.store_root.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &content).await?;
            debug!("Wrote {} ({} bytes)", target.display(), content.len());
        }

        Ok(self.store_root.clone())
    }
}

/// A layer title must stay inside the store: relative, with no parent or
/// root components.
fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
