use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::error;

#[derive(Debug, Deserialize)]
struct RulesFile {
    repository_url: String,
    only: String,
}

/// The single reconciliation rule: which repository to watch and which tag
/// names to consider. Immutable after load.
#[derive(Debug)]
pub struct Rules {
    pub repository_url: String,
    pub only: String,
    matcher: Option<Regex>,
}

impl Rules {
    /// Load the rules YAML from disk. An unreadable or malformed file is
    /// fatal; an invalid `only` regex is not, see [`Rules::new`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let file: RulesFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse rules file {}", path.display()))?;
        Ok(Self::new(file.repository_url, file.only))
    }

    /// Build rules from their two fields, compiling the tag filter up front
    /// so a broken regex shows up in the startup log rather than on first
    /// use. A filter that fails to compile matches nothing: the agent keeps
    /// running but applies no tags until the rule is fixed.
    pub fn new(repository_url: String, only: String) -> Self {
        let matcher = match Regex::new(&only) {
            Ok(re) => Some(re),
            Err(e) => {
                error!(
                    "Tag filter {:?} does not compile ({}); no tags will match until the rules file is corrected",
                    only, e
                );
                None
            }
        };
        Self {
            repository_url,
            only,
            matcher,
        }
    }

    /// Whether a tag name is selected by the rule. Fail-closed: an invalid
    /// filter matches nothing.
    pub fn matches(&self, tag: &str) -> bool {
        match &self.matcher {
            Some(re) => re.is_match(tag),
            None => false,
        }
    }

    /// Split `repository_url` into (registry host, repository path) at the
    /// first `/`. Returns `None` for URLs without a path component; the
    /// reconciler reports that on its first tick.
    pub fn split_repository(&self) -> Option<(&str, &str)> {
        match self.repository_url.split_once('/') {
            Some((host, path)) if !host.is_empty() && !path.is_empty() => Some((host, path)),
            _ => None,
        }
    }
}
