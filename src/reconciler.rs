use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::apply::{ApplyError, ManifestApplier};
use crate::fetch::{ArtifactFetcher, FetchError};
use crate::history::TagHistory;
use crate::registry::{RegistryClient, Tag, TagListing};
use crate::rules::Rules;
use crate::state::RepositoryState;
use crate::verify::{SignatureVerifier, VerifyError};

/// Tag name suffix marking signature sidecar artifacts. Those are consumed
/// by the verifier and never treated as deployable artifacts themselves.
pub(crate) const SIGNATURE_SUFFIX: &str = ".sig";

/// Why a single tag failed to process. Verification and fetch failures skip
/// only the affected tag; an apply failure stops the agent, since a partial
/// rollout should be resolved by the next push rather than retried blindly.
enum TagFailure {
    Verify(VerifyError),
    Fetch(FetchError),
    Apply(ApplyError),
}

/// Periodic driver of the verify-then-apply pipeline. Owns the repository
/// state and readiness flag; everything is wired once in `run` and nothing
/// is global.
pub struct Reconciler {
    rules: Rules,
    registry: RegistryClient,
    verifier: SignatureVerifier,
    fetcher: ArtifactFetcher,
    applier: ManifestApplier,
    state: RepositoryState,
    history: Arc<TagHistory>,
    ready: Arc<AtomicBool>,
    tick_period: Duration,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Rules,
        registry: RegistryClient,
        verifier: SignatureVerifier,
        fetcher: ArtifactFetcher,
        applier: ManifestApplier,
        history: Arc<TagHistory>,
        ready: Arc<AtomicBool>,
        tick_period: Duration,
    ) -> Self {
        Self {
            rules,
            registry,
            verifier,
            fetcher,
            applier,
            state: RepositoryState::new(),
            history,
            ready,
            tick_period,
        }
    }

    /// Run ticks until the stop channel fires. Returns the number of applied
    /// tags on a clean stop; returns an error only on an apply failure,
    /// which is fatal for the process.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> anyhow::Result<usize> {
        info!(
            "Repository watcher started (interval: {}s)",
            self.tick_period.as_secs()
        );
        let mut ticker = interval(self.tick_period);
        let tick_stop = stop.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // The tick itself is never raced against the stop signal:
                    // an in-flight apply completes or fails before exit.
                    if let Err(e) = self.tick(&tick_stop).await {
                        error!("Error applying tag: {}", e);
                        return Err(e.into());
                    }
                }
                _ = stop.changed() => {
                    info!("Reconciler stopping");
                    break;
                }
            }
        }

        Ok(self.state.applied_count())
    }

    /// One reconcile pass. Only an apply failure is returned; every other
    /// failure is logged and retried on a later tick.
    async fn tick(&mut self, stop: &watch::Receiver<bool>) -> Result<(), ApplyError> {
        if !self.ready.load(Ordering::SeqCst) {
            debug!("Waiting for readiness...");
            return Ok(());
        }

        let Some((registry_host, repository)) = self.rules.split_repository() else {
            error!(
                "Invalid repository URL format: {} (expected <host>/<path>)",
                self.rules.repository_url
            );
            return Ok(());
        };
        let (registry_host, repository) = (registry_host.to_string(), repository.to_string());

        let names = match self.registry.list_tags(&registry_host, &repository).await {
            Ok(TagListing::Tags(names)) => names,
            Ok(TagListing::NotAvailable) => {
                info!("🗙 Repository is not available yet, waiting for next tick");
                return Ok(());
            }
            Err(e) => {
                error!("Error fetching tags: {}", e);
                return Ok(());
            }
        };

        let mut observed = Vec::new();
        for name in names {
            if *stop.borrow() {
                info!("Stop requested, leaving remaining tags for the next start");
                break;
            }
            if !is_candidate(&self.rules, &name) {
                debug!(
                    "⚫ Skipping tag '{}' because it is a signature or does not match rules",
                    name
                );
                continue;
            }

            info!("⭐ Found tag: '{}'", name);
            let tag = match self
                .registry
                .fetch_tag_metadata(&registry_host, &repository, &name)
                .await
            {
                Ok(tag) => tag,
                Err(e) => {
                    warn!("Error getting metadata for tag {}: {}", name, e);
                    continue;
                }
            };

            if self.state.is_applied(&tag) || self.state.was_observed(&tag) {
                debug!(
                    "⚫ Skipping tag '{}' at {} because it was already processed",
                    tag.name, tag.digest
                );
                observed.push(tag);
                continue;
            }

            match self.process_tag(&registry_host, &repository, &tag).await {
                Ok(()) => info!("✅ Tag '{}' processed successfully", tag.name),
                Err(TagFailure::Verify(e)) => {
                    error!("Error verifying tag {}: {}", tag.name, e);
                }
                Err(TagFailure::Fetch(e)) => {
                    error!("Error pulling tag {}: {}", tag.name, e);
                }
                Err(TagFailure::Apply(e)) => return Err(e),
            }
            observed.push(tag);
        }

        self.state.replace_observed(observed);
        Ok(())
    }

    /// Verify, pull and apply one tag. Readiness drops for the duration so
    /// the orchestrator does not route to an agent mid-rollout.
    async fn process_tag(
        &mut self,
        registry_host: &str,
        repository: &str,
        tag: &Tag,
    ) -> Result<(), TagFailure> {
        self.ready.store(false, Ordering::SeqCst);
        let result = self.process_tag_inner(registry_host, repository, tag).await;
        self.ready.store(true, Ordering::SeqCst);
        result
    }

    async fn process_tag_inner(
        &mut self,
        registry_host: &str,
        repository: &str,
        tag: &Tag,
    ) -> Result<(), TagFailure> {
        self.verifier
            .verify(registry_host, repository, tag)
            .await
            .map_err(TagFailure::Verify)?;

        info!("⌛ Applying tag: '{}'", tag.name);
        let local_dir = self
            .fetcher
            .pull(registry_host, repository, tag)
            .await
            .map_err(TagFailure::Fetch)?;

        self.applier
            .apply_tree(&local_dir)
            .await
            .map_err(TagFailure::Apply)?;

        self.state.mark_applied(tag);
        self.history
            .record("Apply Tag", format!("Applied tag {}", tag.name));
        info!("✅ Tag '{}' applied successfully", tag.name);
        Ok(())
    }
}

/// The single candidate predicate over a listed tag name: signature sidecars
/// are excluded, everything else must pass the rules filter. Already-seen
/// versions are excluded later, once the digest is known.
pub(crate) fn is_candidate(rules: &Rules, name: &str) -> bool {
    !name.ends_with(SIGNATURE_SUFFIX) && rules.matches(name)
}
