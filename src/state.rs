use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::registry::Tag;

/// In-memory snapshot of the watched repository. Owned exclusively by the
/// reconciler and never persisted across restarts.
#[derive(Debug, Default)]
pub struct RepositoryState {
    pub last_updated: Option<DateTime<Utc>>,
    /// The last observed list of candidate tags, name and digest.
    known_tags: Vec<Tag>,
    /// tag name -> digest of the last successfully applied version. Every
    /// entry was produced by a successful verify-then-apply of that digest,
    /// and is only overwritten by a successfully applied newer digest.
    applied: HashMap<String, String>,
}

impl RepositoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this exact (name, digest) version is the one already applied.
    /// A tag whose digest moved is not considered applied so the newer
    /// observation can win once it verifies.
    pub fn is_applied(&self, tag: &Tag) -> bool {
        self.applied.get(&tag.name).map(String::as_str) == Some(tag.digest.as_str())
    }

    /// Whether this exact (name, digest) observation was already seen in the
    /// previous cycle. Rejected tags stay here until their digest changes,
    /// which re-opens them for evaluation.
    pub fn was_observed(&self, tag: &Tag) -> bool {
        self.known_tags
            .iter()
            .any(|known| known.name == tag.name && known.digest == tag.digest)
    }

    pub fn mark_applied(&mut self, tag: &Tag) {
        self.applied.insert(tag.name.clone(), tag.digest.clone());
    }

    pub fn applied_digest(&self, name: &str) -> Option<&str> {
        self.applied.get(name).map(String::as_str)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn known_tags(&self) -> &[Tag] {
        &self.known_tags
    }

    /// Replace the observed tag list at the end of a cycle.
    pub fn replace_observed(&mut self, tags: Vec<Tag>) {
        self.known_tags = tags;
        self.last_updated = Some(Utc::now());
    }
}
