//! The deployment cache
//!
//! Four definition tiers (process, case, decision, decision requirements)
//! and three model tiers (BPMN, CMMN, DMN), each one [`BoundedCache`] keyed
//! by definition id. Model tiers are paired with the process, case and
//! decision tiers; removing a definition always removes its model too.
//!
//! # Architecture
//!
//! ```text
//! caller → find_deployed_* → DefinitionStore ──┐
//!                                              ▼
//!            definition tier ◄── hit? ── resolve ── miss → repair lock
//!                  ▲                                         │
//!                  └──── DeployContext::register ◄── pipeline replay
//!
//! caller → find_model → model tier ── miss → resource bytes → ModelParser
//! ```
//!
//! Lookup operations live in `resolve`, model loading in `models`,
//! deployment removal in `invalidate`, and the per-family views in `family`.

mod family;
mod invalidate;
mod models;
mod resolve;

pub use family::FamilyCache;
pub use invalidate::RemovalReport;

use crate::bounded::{BoundedCache, TierStats};
use crate::config::CacheConfig;
use crate::deployer::{DeployContext, Deployer, DeployerPipeline};
use crate::error::{CacheError, CacheResult, ConfigError};
use crate::hook::EvictionHook;
use crate::parser::{ModelParser, ParserSet};
use crate::store::{Access, DefinitionStore};
use bpe_model::{Definition, DefinitionKind, Deployment, ModelFormat, ModelInstance};
use parking_lot::{ReentrantMutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for every tier of a [`DeploymentCache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Definition tiers in family order
    pub definitions: Vec<TierStats>,
    /// Model tiers in format order
    pub models: Vec<TierStats>,
    /// Deployment replays run to repair a miss
    pub replays: u64,
}

/// Model tier entry, tagged with the deployment owning its definition
#[derive(Debug, Clone)]
pub(crate) struct CachedModel {
    pub(crate) deployment_id: String,
    pub(crate) model: Arc<ModelInstance>,
}

type ModelTier = Arc<BoundedCache<CachedModel>>;

/// Multi-tier cache of deployed definitions and their parsed models
pub struct DeploymentCache {
    store: Arc<dyn DefinitionStore>,
    pipeline: DeployerPipeline,
    parsers: ParserSet,
    definitions: [BoundedCache<Arc<Definition>>; 4],
    models: [ModelTier; 3],
    repair_lock: ReentrantMutex<()>,
    hooks: RwLock<Vec<Arc<dyn EvictionHook>>>,
    replays: AtomicU64,
}

/// Builder for [`DeploymentCache`]
pub struct DeploymentCacheBuilder {
    store: Arc<dyn DefinitionStore>,
    config: CacheConfig,
    pipeline: DeployerPipeline,
    parsers: ParserSet,
    hooks: Vec<Arc<dyn EvictionHook>>,
}

impl DeploymentCacheBuilder {
    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// With deployer appended to the pipeline
    ///
    /// Without any deployer the pipeline holds a single
    /// [`RegisteringDeployer`](crate::deployer::RegisteringDeployer).
    #[must_use]
    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.pipeline.push(deployer);
        self
    }

    /// With parser for one model format
    #[must_use]
    pub fn with_parser(mut self, format: ModelFormat, parser: Arc<dyn ModelParser>) -> Self {
        self.parsers = self.parsers.with_parser(format, parser);
        self
    }

    /// With eviction hook
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn EvictionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Validate configuration and build the cache
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if a tier capacity is zero
    pub fn build(self) -> Result<DeploymentCache, ConfigError> {
        self.config.validate()?;
        let config = &self.config;

        let models: [ModelTier; 3] = ModelFormat::ALL.map(|format| {
            Arc::new(BoundedCache::with_eviction(
                format.name(),
                config.model_capacity(format),
                config.eviction,
            ))
        });
        // a definition dropped for capacity takes its model along
        let definitions = DefinitionKind::ALL.map(|kind| {
            let capacity = config.definition_capacity(kind);
            match kind.model_format() {
                Some(format) => {
                    let paired = Arc::clone(&models[format.index()]);
                    BoundedCache::with_capacity_listener(
                        kind.label(),
                        capacity,
                        config.eviction,
                        move |id: &str, _: Arc<Definition>| {
                            if paired.remove(id).is_some() {
                                tracing::debug!("dropped {} model of evicted {} '{}'", format, kind, id);
                            }
                        },
                    )
                }
                None => BoundedCache::with_eviction(kind.label(), capacity, config.eviction),
            }
        });
        let pipeline = if self.pipeline.is_empty() {
            DeployerPipeline::registering()
        } else {
            self.pipeline
        };

        tracing::info!(
            "deployment cache ready: capacity {}, eviction {:?}, deployers {:?}",
            config.capacity,
            config.eviction,
            pipeline.names()
        );

        Ok(DeploymentCache {
            store: self.store,
            pipeline,
            parsers: self.parsers,
            definitions,
            models,
            repair_lock: ReentrantMutex::new(()),
            hooks: RwLock::new(self.hooks),
            replays: AtomicU64::new(0),
        })
    }
}

impl DeploymentCache {
    /// Start building a cache over `store`
    #[must_use]
    pub fn builder(store: Arc<dyn DefinitionStore>) -> DeploymentCacheBuilder {
        DeploymentCacheBuilder {
            store,
            config: CacheConfig::default(),
            pipeline: DeployerPipeline::new(),
            parsers: ParserSet::default(),
            hooks: Vec::new(),
        }
    }

    /// Create cache with default configuration, registering deployer and
    /// JSON parsers
    ///
    /// # Errors
    /// Never fails with the default configuration; see
    /// [`DeploymentCacheBuilder::build`]
    pub fn new(store: Arc<dyn DefinitionStore>) -> Result<Self, ConfigError> {
        Self::builder(store).build()
    }

    /// Storage backend the cache resolves against
    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn DefinitionStore {
        self.store.as_ref()
    }

    /// Deployer pipeline run on deploy and replay
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &DeployerPipeline {
        &self.pipeline
    }

    /// Register an eviction hook
    pub fn add_hook(&self, hook: Arc<dyn EvictionHook>) {
        self.hooks.write().push(hook);
    }

    pub(crate) fn definition_tier(&self, kind: DefinitionKind) -> &BoundedCache<Arc<Definition>> {
        &self.definitions[kind.index()]
    }

    pub(crate) fn model_tier(&self, format: ModelFormat) -> &BoundedCache<CachedModel> {
        &self.models[format.index()]
    }

    /// Tier-only lookup; never consults storage
    #[must_use]
    pub fn find_from_cache(&self, kind: DefinitionKind, id: &str) -> Option<Arc<Definition>> {
        self.definition_tier(kind).get(id)
    }

    /// Cached model, if loaded; never consults storage
    #[must_use]
    pub fn find_model_from_cache(&self, format: ModelFormat, definition_id: &str) -> Option<Arc<ModelInstance>> {
        self.model_tier(format)
            .get(definition_id)
            .map(|cached| cached.model)
    }

    /// Put a definition into its tier, overwriting any entry with the same id
    pub fn add_definition(&self, definition: Definition) -> Arc<Definition> {
        let shared = Arc::new(definition);
        self.definition_tier(shared.kind())
            .put(shared.id(), Arc::clone(&shared));
        shared
    }

    /// Evict a definition and its model, then notify eviction hooks
    ///
    /// Returns `true` if a definition was cached under `id`.
    ///
    /// # Errors
    /// Returns `CacheError::EvictionFailed` if a hook fails. Both entries
    /// are gone by then; remaining hooks still run.
    pub fn remove_definition(&self, kind: DefinitionKind, id: &str) -> CacheResult<bool> {
        let Some(evicted) = self.evict(kind, id) else {
            return Ok(false);
        };

        let mut first_failure = None;
        for hook in self.hooks.read().iter() {
            if let Err(source) = hook.on_evict(&evicted) {
                tracing::debug!("eviction hook '{}' failed for '{}': {}", hook.name(), id, source);
                first_failure.get_or_insert(CacheError::EvictionFailed {
                    kind,
                    definition_id: id.to_string(),
                    source,
                });
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Clear a definition tier and its paired model tier
    pub fn discard_all(&self, kind: DefinitionKind) {
        self.definition_tier(kind).clear();
        if let Some(format) = kind.model_format() {
            self.model_tier(format).clear();
        }
        tracing::info!("discarded every cached {}", kind);
    }

    /// Run the pipeline for a new deployment
    ///
    /// Storage access is elevated for the run, as it is for a replay.
    ///
    /// # Errors
    /// Returns the pipeline failure; entries inserted by the failed run are
    /// removed again
    pub fn deploy(&self, deployment: &Deployment) -> CacheResult<()> {
        let _guard = self.repair_lock.lock();
        self.run_pipeline(deployment, Access::Elevated)?;
        tracing::info!("deployed '{}'", deployment.id());
        Ok(())
    }

    /// Replays run so far to repair misses
    #[must_use]
    pub fn replay_count(&self) -> u64 {
        self.replays.load(Ordering::Relaxed)
    }

    /// Statistics of every tier
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            definitions: self.definitions.iter().map(BoundedCache::stats).collect(),
            models: self.models.iter().map(|tier| tier.stats()).collect(),
            replays: self.replay_count(),
        }
    }

    /// View of one definition family
    #[must_use]
    pub fn family(&self, kind: DefinitionKind) -> FamilyCache<'_> {
        FamilyCache::new(self, kind)
    }

    /// Process definitions
    #[must_use]
    pub fn processes(&self) -> FamilyCache<'_> {
        self.family(DefinitionKind::Process)
    }

    /// Case definitions
    #[must_use]
    pub fn cases(&self) -> FamilyCache<'_> {
        self.family(DefinitionKind::Case)
    }

    /// Decision definitions
    #[must_use]
    pub fn decisions(&self) -> FamilyCache<'_> {
        self.family(DefinitionKind::Decision)
    }

    /// Decision requirements definitions
    #[must_use]
    pub fn decision_requirements(&self) -> FamilyCache<'_> {
        self.family(DefinitionKind::DecisionRequirements)
    }

    /// Remove a definition and its paired model without notifying hooks
    ///
    /// Holds the repair lock so an eviction cannot land between a replay
    /// and the tier re-read that follows it.
    fn evict(&self, kind: DefinitionKind, id: &str) -> Option<Arc<Definition>> {
        let _guard = self.repair_lock.lock();
        let evicted = self.definition_tier(kind).remove(id);
        if let Some(format) = kind.model_format() {
            self.model_tier(format).remove(id);
        }
        evicted
    }

    /// Run the pipeline, undoing its insertions on failure
    fn run_pipeline(&self, deployment: &Deployment, access: Access) -> CacheResult<()> {
        let context = DeployContext::new(self, access);
        let outcome = self.pipeline.run(deployment, &context);

        if let Err(err) = outcome {
            let inserted = context.into_inserted();
            for (kind, id) in &inserted {
                self.evict(*kind, id);
            }
            tracing::warn!(
                "pipeline failed for deployment '{}', rolled back {} cache entries: {}",
                deployment.id(),
                inserted.len(),
                err
            );
            return Err(err.into());
        }
        Ok(())
    }
}

impl fmt::Debug for DeploymentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentCache")
            .field("definitions", &self.definitions)
            .field("models", &self.models)
            .field("pipeline", &self.pipeline)
            .field("hooks", &self.hooks.read().len())
            .field("replays", &self.replay_count())
            .finish()
    }
}
