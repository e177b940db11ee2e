use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use tracing::debug;

use super::error::RegistryError;
use super::models::{ImageManifest, Tag, TagList};

/// Both manifest flavors an in-cluster registry may serve. Offered on every
/// manifest request so the registry can answer with whichever it stores.
const MANIFEST_ACCEPT: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Result of listing tags: the repository may simply not exist yet, which is
/// a normal condition during bootstrap rather than an error.
#[derive(Debug)]
pub enum TagListing {
    Tags(Vec<String>),
    NotAvailable,
}

/// Minimal OCI distribution client speaking plain HTTP. The deployment
/// target is an in-cluster registry, so TLS is intentionally not used.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// List the tags of a repository via `GET /v2/{repo}/tags/list`.
    ///
    /// A 404 means the repository has not been created yet and maps to
    /// [`TagListing::NotAvailable`]; any other non-200 status is an error.
    pub async fn list_tags(
        &self,
        registry: &str,
        repository: &str,
    ) -> Result<TagListing, RegistryError> {
        let url = format!("http://{registry}/v2/{repository}/tags/list");
        debug!("Listing tags from {}", url);

        let response = self.http.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(TagListing::NotAvailable),
            StatusCode::OK => {}
            status => {
                return Err(RegistryError::Status {
                    status: status.as_u16(),
                    url,
                })
            }
        }

        let body = response.text().await?;
        let listing: TagList = serde_json::from_str(&body)?;
        Ok(TagListing::Tags(listing.tags))
    }

    /// Fetch a tag's manifest and return the [`Tag`] observation.
    ///
    /// The canonical digest comes from the `Docker-Content-Digest` response
    /// header, which the registry is contractually bound to set; the digest
    /// is never derived from the body. Manifest annotations ride along for
    /// observability.
    pub async fn fetch_tag_metadata(
        &self,
        registry: &str,
        repository: &str,
        tag_name: &str,
    ) -> Result<Tag, RegistryError> {
        let url = format!("http://{registry}/v2/{repository}/manifests/{tag_name}");
        let response = self.http.get(&url).header(ACCEPT, MANIFEST_ACCEPT).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RegistryError::MissingDigest(url.clone()))?;

        let body = response.text().await?;
        let manifest: ImageManifest = serde_json::from_str(&body)?;

        Ok(Tag {
            name: tag_name.to_string(),
            digest,
            annotations: manifest.annotations,
        })
    }

    /// Fetch a manifest by tag or digest reference.
    pub async fn fetch_manifest(
        &self,
        registry: &str,
        repository: &str,
        reference: &str,
    ) -> Result<ImageManifest, RegistryError> {
        let url = format!("http://{registry}/v2/{repository}/manifests/{reference}");
        let response = self.http.get(&url).header(ACCEPT, MANIFEST_ACCEPT).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch a blob by digest via `GET /v2/{repo}/blobs/{digest}`.
    pub async fn fetch_blob(
        &self,
        registry: &str,
        repository: &str,
        digest: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = format!("http://{registry}/v2/{repository}/blobs/{digest}");
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}
