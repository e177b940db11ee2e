mod client;
mod error;
mod models;

pub use client::{RegistryClient, TagListing};
pub use error::RegistryError;
pub use models::{ImageManifest, ManifestLayer, Tag};
