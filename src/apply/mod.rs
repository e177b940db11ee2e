mod applier;
mod error;

pub use applier::ManifestApplier;
pub use error::ApplyError;
