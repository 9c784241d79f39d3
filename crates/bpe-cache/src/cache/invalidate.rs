//! Cascading invalidation of a removed deployment
//!
//! Best effort per entry: one failure is logged and recorded in the
//! [`RemovalReport`], and the pass moves on to the next definition.

use super::DeploymentCache;
use crate::error::CacheError;
use crate::store::Access;
use bpe_model::DefinitionKind;
use std::collections::BTreeSet;

/// Outcome of [`DeploymentCache::remove_deployment`]
#[derive(Debug, Default)]
pub struct RemovalReport {
    /// Deployment the pass ran for
    pub deployment_id: String,
    /// Definitions evicted without error
    pub evicted: usize,
    /// Per-entry failures, in the order they happened
    pub failures: Vec<CacheError>,
}

impl RemovalReport {
    /// Check if every removal succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl DeploymentCache {
    /// Evict every definition and model belonging to a deployment
    ///
    /// Storage is asked for the definitions of each family in the
    /// deployment; each is removed through
    /// [`remove_definition`](Self::remove_definition). Entries still cached
    /// for the deployment afterwards (storage could not list them) are
    /// swept from the tiers directly, and so are models still cached for
    /// the deployment.
    pub fn remove_deployment(&self, deployment_id: &str) -> RemovalReport {
        let mut report = RemovalReport {
            deployment_id: deployment_id.to_string(),
            ..RemovalReport::default()
        };

        for kind in DefinitionKind::ALL {
            let listed = match self
                .store
                .list_definitions_by_deployment(kind, deployment_id, Access::Elevated)
            {
                Ok(listed) => listed,
                Err(err) => {
                    tracing::warn!(
                        "could not list {}s of deployment '{}': {}",
                        kind,
                        deployment_id,
                        err
                    );
                    report.failures.push(CacheError::from_store(kind, err));
                    Vec::new()
                }
            };

            let mut seen = BTreeSet::new();
            for definition in &listed {
                seen.insert(definition.id().to_string());
                match self.remove_definition(kind, definition.id()) {
                    Ok(true) => report.evicted += 1,
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!("failed to evict entry: {}", err);
                        report.failures.push(err);
                    }
                }
            }

            self.sweep(kind, deployment_id, &seen, &mut report);
        }

        tracing::info!(
            "removed deployment '{}' from the cache: {} evicted, {} failures",
            deployment_id,
            report.evicted,
            report.failures.len()
        );
        report
    }

    fn sweep(
        &self,
        kind: DefinitionKind,
        deployment_id: &str,
        seen: &BTreeSet<String>,
        report: &mut RemovalReport,
    ) {
        let stale: Vec<String> = self
            .definition_tier(kind)
            .entries()
            .into_iter()
            .filter(|(id, definition)| definition.deployment_id() == deployment_id && !seen.contains(id))
            .map(|(id, _)| id)
            .collect();

        for id in stale {
            tracing::debug!("sweeping unlisted {} '{}'", kind, id);
            match self.remove_definition(kind, &id) {
                Ok(true) => report.evicted += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!("failed to evict entry: {}", err);
                    report.failures.push(err);
                }
            }
        }

        let Some(format) = kind.model_format() else {
            return;
        };
        let _guard = self.repair_lock.lock();
        let tier = self.model_tier(format);
        for (id, cached) in tier.entries() {
            if cached.deployment_id == deployment_id {
                tracing::debug!("sweeping {} model '{}' of removed deployment", format, id);
                tier.remove(&id);
            }
        }
    }
}
