use thiserror::Error;

use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("public key error: {0}")]
    Key(String),

    #[error("malformed digest {0:?}")]
    MalformedDigest(String),

    #[error("no signatures found for {0}")]
    NoSignatures(String),

    #[error("digest mismatch: expected {expected}, signed {signed}")]
    DigestMismatch { expected: String, signed: String },

    #[error("invalid signature payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("signature is invalid: {0}")]
    Signature(String),

    #[error("failed to fetch signature artifact: {0}")]
    Registry(#[from] RegistryError),
}
