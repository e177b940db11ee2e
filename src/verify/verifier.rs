use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

use super::error::VerifyError;
use crate::registry::{ManifestLayer, RegistryClient, Tag};

/// Media type of Cosign simple-signing payload layers.
pub(crate) const SIMPLE_SIGNING_MEDIA_TYPE: &str =
    "application/vnd.dev.cosign.simplesigning.v1+json";

/// Layer annotation carrying the base64 raw signature bytes.
pub(crate) const SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";

/// The simple-signing payload. Only the digest binding is consumed; the rest
/// of the document is opaque to the agent.
#[derive(Debug, Deserialize)]
struct SignaturePayload {
    critical: Critical,
}

#[derive(Debug, Deserialize)]
struct Critical {
    image: CriticalImage,
}

#[derive(Debug, Deserialize)]
struct CriticalImage {
    #[serde(rename = "docker-manifest-digest")]
    docker_manifest_digest: String,
}

/// Verifies Cosign-style detached signatures against the operator-supplied
/// ECDSA public key. Signature artifacts live in the same repository as the
/// signed artifact, under the digest-derived `.sig` tag.
pub struct SignatureVerifier {
    registry: RegistryClient,
    key_path: PathBuf,
}

impl SignatureVerifier {
    pub fn new(registry: RegistryClient, key_path: PathBuf) -> Self {
        Self { registry, key_path }
    }

    /// Verify a tag's digest. Returns `Ok(())` only when at least one
    /// co-located signature both binds to this exact digest and verifies
    /// under the configured key. Every failure path is a [`VerifyError`]
    /// and never promotes the tag to applied.
    pub async fn verify(
        &self,
        registry_host: &str,
        repository: &str,
        tag: &Tag,
    ) -> Result<(), VerifyError> {
        info!("🔍 Verifying tag: {}", tag.name);

        let key = self.load_public_key()?;
        let image_ref = format!("{registry_host}/{repository}@{}", tag.digest);
        let sig_tag = signature_tag(&tag.digest)?;

        let manifest = match self
            .registry
            .fetch_manifest(registry_host, repository, &sig_tag)
            .await
        {
            Ok(manifest) => manifest,
            Err(err) if err.is_not_found() => {
                return Err(VerifyError::NoSignatures(image_ref));
            }
            Err(err) => return Err(err.into()),
        };

        let mut last_failure = None;
        let mut signatures_seen = false;

        for layer in &manifest.layers {
            if layer.media_type != SIMPLE_SIGNING_MEDIA_TYPE {
                continue;
            }
            signatures_seen = true;

            match self
                .check_signature(&key, registry_host, repository, tag, layer)
                .await
            {
                Ok(()) => {
                    info!("✅ Signature is valid for tag '{}'", tag.name);
                    if !tag.annotations.is_empty() {
                        info!("📝 Annotations:");
                        for (name, value) in &tag.annotations {
                            info!("👀  {}: {}", name, value);
                        }
                    }
                    return Ok(());
                }
                Err(err) => {
                    debug!("Signature candidate rejected for '{}': {}", tag.name, err);
                    last_failure = Some(err);
                }
            }
        }

        if !signatures_seen {
            return Err(VerifyError::NoSignatures(image_ref));
        }
        Err(last_failure.expect("at least one signature was seen"))
    }

    /// Check one signature layer: bind its payload to the tag digest, then
    /// verify ECDSA-SHA256 over the payload bytes.
    async fn check_signature(
        &self,
        key: &VerifyingKey,
        registry_host: &str,
        repository: &str,
        tag: &Tag,
        layer: &ManifestLayer,
    ) -> Result<(), VerifyError> {
        let encoded = layer
            .annotations
            .get(SIGNATURE_ANNOTATION)
            .ok_or_else(|| VerifyError::Signature("signature annotation missing".into()))?;
        let sig_bytes = STANDARD.decode(encoded.trim())?;

        let payload = self
            .registry
            .fetch_blob(registry_host, repository, &layer.digest)
            .await?;
        let parsed: SignaturePayload = serde_json::from_slice(&payload)?;
        let signed_digest = parsed.critical.image.docker_manifest_digest;

        debug!("📦 Signed digest: {}", signed_digest);
        debug!("🔒 Expected digest: {}", tag.digest);

        if signed_digest != tag.digest {
            return Err(VerifyError::DigestMismatch {
                expected: tag.digest.clone(),
                signed: signed_digest,
            });
        }

        // Cosign emits ASN.1 DER signatures; accept the fixed 64-byte form
        // as well.
        let signature = Signature::from_der(&sig_bytes)
            .or_else(|_| Signature::from_slice(&sig_bytes))
            .map_err(|e| VerifyError::Signature(format!("malformed signature: {e}")))?;

        key.verify(&payload, &signature)
            .map_err(|e| VerifyError::Signature(e.to_string()))
    }

    /// Load the operator key. The file holds base64-wrapped PEM: decode the
    /// base64, parse the PEM, and require an ECDSA P-256 public key. Read on
    /// every verification so a key rotated on disk takes effect without a
    /// restart.
    fn load_public_key(&self) -> Result<VerifyingKey, VerifyError> {
        let raw = std::fs::read_to_string(&self.key_path).map_err(|e| {
            VerifyError::Key(format!(
                "failed to read {}: {e}",
                self.key_path.display()
            ))
        })?;

        let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let pem_bytes = STANDARD
            .decode(compact)
            .map_err(|e| VerifyError::Key(format!("failed to decode base64 public key: {e}")))?;
        let pem = String::from_utf8(pem_bytes)
            .map_err(|e| VerifyError::Key(format!("public key is not valid PEM text: {e}")))?;

        VerifyingKey::from_public_key_pem(&pem)
            .map_err(|e| VerifyError::Key(format!("expected an ECDSA public key: {e}")))
    }
}

/// Tag under which the signature artifact for a digest is stored, per the
/// Cosign convention: `sha256:abc` -> `sha256-abc.sig`.
fn signature_tag(digest: &str) -> Result<String, VerifyError> {
    let (algorithm, hex) = digest
        .split_once(':')
        .ok_or_else(|| VerifyError::MalformedDigest(digest.to_string()))?;
    Ok(format!("{algorithm}-{hex}.sig"))
}
