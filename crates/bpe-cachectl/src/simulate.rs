//! Cold-start resolution simulation against the in-memory backend

use anyhow::Context;
use bpe_cache::{CacheConfig, CacheStats, DeploymentCache, InMemoryStore};
use bpe_model::{Definition, DefinitionKind, Deployment, ModelElement, ModelFormat, ModelInstance, Resource};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Families seeded by the simulation, round robin
const SEEDED_KINDS: [DefinitionKind; 3] = [
    DefinitionKind::Process,
    DefinitionKind::Case,
    DefinitionKind::Decision,
];

#[derive(Debug, Clone)]
pub(crate) struct SimulationOptions {
    pub(crate) definitions: usize,
    pub(crate) per_deployment: usize,
    pub(crate) threads: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemovalSummary {
    deployment_id: String,
    evicted: usize,
    failures: Vec<String>,
    orphans: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct SimulationReport {
    definitions: usize,
    deployments: usize,
    threads: usize,
    lookups: usize,
    lookup_failures: usize,
    models_loaded: usize,
    model_failures: usize,
    elapsed_ms: u128,
    removal: Option<RemovalSummary>,
    stats: CacheStats,
}

impl SimulationReport {
    /// Every lookup and model load succeeded, no definition was replayed
    /// twice and removal left nothing behind
    pub(crate) fn passed(&self) -> bool {
        self.lookup_failures == 0
            && self.model_failures == 0
            && self.stats.replays <= self.definitions as u64
            && self
                .removal
                .as_ref()
                .map_or(true, |r| r.failures.is_empty() && r.orphans == 0)
    }

    pub(crate) fn generate_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Deployment cache simulation\n");
        out.push_str("===========================\n");
        out.push_str(&format!(
            "Seeded: {} definitions in {} deployments\n",
            self.definitions, self.deployments
        ));
        out.push_str(&format!(
            "Lookups: {} on {} threads, {} failed\n",
            self.lookups, self.threads, self.lookup_failures
        ));
        out.push_str(&format!(
            "Models: {} loaded, {} failed\n",
            self.models_loaded, self.model_failures
        ));
        out.push_str(&format!("Replays: {}\n", self.stats.replays));
        out.push_str(&format!("Elapsed: {} ms\n\n", self.elapsed_ms));

        out.push_str("Tier              entries    hits  misses  hit rate\n");
        for tier in self.stats.definitions.iter().chain(&self.stats.models) {
            out.push_str(&format!(
                "{:<16} {:>8} {:>7} {:>7} {:>8.1}%\n",
                tier.name,
                tier.entry_count,
                tier.hits,
                tier.misses,
                tier.hit_rate() * 100.0
            ));
        }

        if let Some(removal) = &self.removal {
            out.push_str(&format!(
                "\nRemoved deployment '{}': {} evicted, {} failures, {} orphans\n",
                removal.deployment_id,
                removal.evicted,
                removal.failures.len(),
                removal.orphans
            ));
            for failure in &removal.failures {
                out.push_str(&format!("  - {failure}\n"));
            }
        }

        out.push_str(&format!(
            "\nResult: {}\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        out
    }
}

fn model_bytes(format: ModelFormat, key: &str) -> anyhow::Result<Vec<u8>> {
    let element_type = match format {
        ModelFormat::Bpmn => "process",
        ModelFormat::Cmmn => "case",
        ModelFormat::Dmn => "decision",
    };
    let root = ModelElement::new(ModelInstance::ROOT_ELEMENT)
        .with_child(ModelElement::new(element_type).with_id(key));
    serde_json::to_vec(&root).context("encoding model")
}

/// Persist `options.definitions` definitions, returning them and the
/// deployment ids in creation order
fn seed(store: &InMemoryStore, options: &SimulationOptions) -> anyhow::Result<(Vec<Definition>, Vec<String>)> {
    let per_deployment = options.per_deployment.max(1);
    let mut definitions = Vec::with_capacity(options.definitions);
    let mut deployment_ids = Vec::new();

    for (chunk, start) in (0..options.definitions).step_by(per_deployment).enumerate() {
        let deployment_id = Uuid::new_v4().to_string();
        let mut deployment = Deployment::new(deployment_id.as_str()).with_name(format!("batch-{chunk}"));

        for i in start..(start + per_deployment).min(options.definitions) {
            let kind = SEEDED_KINDS[i % SEEDED_KINDS.len()];
            let Some(format) = kind.model_format() else {
                continue;
            };
            let key = format!("{}-{i}", kind.label());
            let resource_name = format!("{key}.{}", format.resource_suffixes().last().copied().unwrap_or("bpmn"));

            deployment.add_resource(Resource::new(
                deployment_id.as_str(),
                resource_name.as_str(),
                model_bytes(format, &key)?,
            ));
            let definition = Definition::new(
                kind,
                format!("{key}:1:{deployment_id}"),
                key.as_str(),
                1,
                deployment_id.as_str(),
                resource_name,
            );
            store.insert_definition(definition.clone());
            definitions.push(definition);
        }

        store.insert_deployment(deployment);
        deployment_ids.push(deployment_id);
    }
    Ok((definitions, deployment_ids))
}

pub(crate) fn run(config: CacheConfig, options: &SimulationOptions) -> anyhow::Result<SimulationReport> {
    let store = Arc::new(InMemoryStore::new());
    let (definitions, deployment_ids) = seed(&store, options)?;
    tracing::info!(
        "seeded {} definitions in {} deployments",
        definitions.len(),
        deployment_ids.len()
    );

    let cache = DeploymentCache::builder(store.clone())
        .with_config(config)
        .build()
        .context("building deployment cache")?;

    let started = Instant::now();
    let threads = options.threads.max(1);
    let lookups = AtomicUsize::new(0);
    let lookup_failures = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for worker in 0..threads {
            let (cache, definitions) = (&cache, &definitions);
            let (lookups, lookup_failures) = (&lookups, &lookup_failures);
            scope.spawn(move || {
                // each worker walks the same ids from a different offset
                let offset = worker * definitions.len() / threads;
                for i in 0..definitions.len() {
                    let definition = &definitions[(i + offset) % definitions.len()];
                    lookups.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = cache.find_deployed_by_id(definition.kind(), definition.id()) {
                        tracing::warn!("lookup of '{}' failed: {}", definition.id(), err);
                        lookup_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let mut models_loaded = 0;
    let mut model_failures = 0;
    for definition in definitions.iter().filter(|d| d.kind() == DefinitionKind::Process) {
        match cache.find_bpmn_model(definition.id()) {
            Ok(_) => models_loaded += 1,
            Err(err) => {
                tracing::warn!("model of '{}' failed: {}", definition.id(), err);
                model_failures += 1;
            }
        }
    }

    let removal = deployment_ids.first().map(|deployment_id| {
        let report = cache.remove_deployment(deployment_id);
        store.delete_deployment(deployment_id);

        let orphans = definitions
            .iter()
            .filter(|d| d.deployment_id() == deployment_id.as_str())
            .filter(|d| {
                cache.find_from_cache(d.kind(), d.id()).is_some()
                    || d.kind()
                        .model_format()
                        .is_some_and(|format| cache.find_model_from_cache(format, d.id()).is_some())
            })
            .count();

        RemovalSummary {
            deployment_id: report.deployment_id,
            evicted: report.evicted,
            failures: report.failures.iter().map(ToString::to_string).collect(),
            orphans,
        }
    });

    Ok(SimulationReport {
        definitions: definitions.len(),
        deployments: deployment_ids.len(),
        threads,
        lookups: lookups.into_inner(),
        lookup_failures: lookup_failures.into_inner(),
        models_loaded,
        model_failures,
        elapsed_ms: started.elapsed().as_millis(),
        removal,
        stats: cache.stats(),
    })
}
