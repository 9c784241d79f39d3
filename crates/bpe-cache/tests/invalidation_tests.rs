//! Removal, discard, rollback and cascading invalidation
//!
//! Run with: cargo test --package bpe-cache --test invalidation_tests

use bpe_cache::prelude::*;
use bpe_cache::{CacheConfig, CacheError};
use bpe_test_utils::{
    definition_id, seeded_store, CountingDeployer, DeploymentFixture, FailingDeployer, NoopDeployer, RecordingHook,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashMap;

fn warm(cache: &DeploymentCache, definitions: &[Definition]) {
    for definition in definitions {
        cache
            .find_deployed_by_id(definition.kind(), definition.id())
            .unwrap();
        if definition.kind().model_format().is_some() {
            cache.find_model_for(definition).unwrap();
        }
    }
}

#[test]
fn removal_leaves_no_orphaned_model() {
    let store = seeded_store([DeploymentFixture::new("d1")
        .with_definition(DefinitionKind::Process, "order", 1)
        .with_definition(DefinitionKind::Case, "claim", 1)
        .with_definition(DefinitionKind::Decision, "dish", 1)]);
    let cache = DeploymentCache::new(store).unwrap();

    for (kind, format, key) in [
        (DefinitionKind::Process, ModelFormat::Bpmn, "order"),
        (DefinitionKind::Case, ModelFormat::Cmmn, "claim"),
        (DefinitionKind::Decision, ModelFormat::Dmn, "dish"),
    ] {
        let id = definition_id(key, 1, "d1");
        cache.find_model(format, &id).unwrap();
        assert!(cache.find_model_from_cache(format, &id).is_some());

        assert!(cache.remove_definition(kind, &id).unwrap());
        assert!(cache.find_from_cache(kind, &id).is_none());
        assert!(cache.find_model_from_cache(format, &id).is_none());
    }
}

#[test]
fn cascading_removal_survives_one_failing_entry() {
    let fixture = DeploymentFixture::new("d")
        .with_definition(DefinitionKind::Decision, "a", 1)
        .with_definition(DefinitionKind::Decision, "b", 1)
        .with_definition(DefinitionKind::Decision, "c", 1);
    let other = DeploymentFixture::new("other").with_definition(DefinitionKind::Decision, "a", 2);
    let definitions = [fixture.definitions(), other.definitions()].concat();
    let store = seeded_store([fixture, other]);

    let hook = Arc::new(RecordingHook::failing_for([definition_id("b", 1, "d")]));
    let cache = DeploymentCache::builder(store)
        .with_hook(hook.clone())
        .build()
        .unwrap();
    warm(&cache, &definitions);

    let report = cache.remove_deployment("d");

    assert_eq!(report.evicted, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        CacheError::EvictionFailed { kind: DefinitionKind::Decision, ref definition_id, .. }
            if definition_id == "b:1:d"
    ));
    for key in ["a", "b", "c"] {
        let id = definition_id(key, 1, "d");
        assert!(cache.find_from_cache(DefinitionKind::Decision, &id).is_none());
        assert!(cache.find_model_from_cache(ModelFormat::Dmn, &id).is_none());
    }
    assert!(cache
        .find_from_cache(DefinitionKind::Decision, &definition_id("a", 2, "other"))
        .is_some());

    let mut evicted = hook.evicted();
    evicted.sort();
    assert_eq!(evicted, vec!["a:1:d", "b:1:d", "c:1:d"]);
}

#[test]
fn cascading_removal_covers_every_family() {
    let fixture = DeploymentFixture::new("d1")
        .with_definition(DefinitionKind::Process, "order", 1)
        .with_definition(DefinitionKind::Case, "claim", 1)
        .with_definition_in(DefinitionKind::Decision, "dish", 1, "rules.dmn")
        .with_definition_in(DefinitionKind::DecisionRequirements, "rules", 1, "rules.dmn");
    let definitions = fixture.definitions().to_vec();
    let cache = DeploymentCache::new(seeded_store([fixture])).unwrap();
    warm(&cache, &definitions);

    let report = cache.remove_deployment("d1");
    assert!(report.is_clean());
    assert_eq!(report.evicted, 4);
    for definition in &definitions {
        assert!(cache.find_from_cache(definition.kind(), definition.id()).is_none());
    }
    let stats = cache.stats();
    assert!(stats.definitions.iter().all(|t| t.entry_count == 0));
    assert!(stats.models.iter().all(|t| t.entry_count == 0));
}

#[test]
fn removal_after_capacity_eviction_leaves_no_model() {
    let fixture = DeploymentFixture::new("d1")
        .with_definition(DefinitionKind::Decision, "a", 1)
        .with_definition(DefinitionKind::Decision, "b", 1)
        .with_definition(DefinitionKind::Decision, "c", 1);
    let definitions = fixture.definitions().to_vec();
    let cache = DeploymentCache::builder(seeded_store([fixture]))
        .with_config(CacheConfig::new().with_definition_capacity(DefinitionKind::Decision, 2))
        .build()
        .unwrap();
    for definition in &definitions {
        cache.find_dmn_model(definition.id()).unwrap();
    }

    let report = cache.remove_deployment("d1");
    assert!(report.is_clean());
    assert_eq!(report.evicted, 2);
    assert_eq!(cache.stats().models[ModelFormat::Dmn.index()].entry_count, 0);
}

#[test]
fn discard_all_resets_one_family() {
    let fixture = DeploymentFixture::new("d1")
        .with_definition(DefinitionKind::Process, "order", 1)
        .with_definition(DefinitionKind::Case, "claim", 1);
    let definitions = fixture.definitions().to_vec();
    let cache = DeploymentCache::new(seeded_store([fixture])).unwrap();
    warm(&cache, &definitions);

    cache.processes().discard_all();

    let order = definition_id("order", 1, "d1");
    let claim = definition_id("claim", 1, "d1");
    assert!(cache.find_from_cache(DefinitionKind::Process, &order).is_none());
    assert!(cache.find_model_from_cache(ModelFormat::Bpmn, &order).is_none());
    assert!(cache.find_from_cache(DefinitionKind::Case, &claim).is_some());
    assert!(cache.find_model_from_cache(ModelFormat::Cmmn, &claim).is_some());

    // discarded entries come back through replay
    cache.processes().find_deployed_by_id(&order).unwrap();
}

#[test]
fn failed_replay_leaves_tiers_untouched() {
    let store = seeded_store([DeploymentFixture::new("d1")
        .with_definition_in(DefinitionKind::Decision, "dish", 1, "rules.dmn")
        .with_definition_in(DefinitionKind::DecisionRequirements, "rules", 1, "rules.dmn")]);
    let cache = DeploymentCache::builder(store)
        .with_deployer(Arc::new(FailingDeployer::after_registering()))
        .build()
        .unwrap();

    let err = cache
        .find_deployed_by_id(DefinitionKind::Decision, &definition_id("dish", 1, "d1"))
        .unwrap_err();
    assert!(matches!(err, CacheError::Deploy(_)));

    let stats = cache.stats();
    assert!(stats.definitions.iter().all(|t| t.entry_count == 0));
}

#[test]
fn failed_deploy_keeps_entries_cached_before_it() {
    let fixture = DeploymentFixture::new("d1")
        .with_definition(DefinitionKind::Process, "order", 1)
        .with_definition(DefinitionKind::Process, "invoice", 1);
    let deployment = fixture.deployment().clone();
    let definitions = fixture.definitions().to_vec();
    let store = seeded_store([fixture]);

    let cache = DeploymentCache::builder(store)
        .with_deployer(Arc::new(FailingDeployer::after_registering()))
        .build()
        .unwrap();
    let kept = cache.add_definition(definitions[0].clone());

    assert!(cache.deploy(&deployment).is_err());
    let cached = cache.find_from_cache(DefinitionKind::Process, definitions[0].id()).unwrap();
    assert!(Arc::ptr_eq(&kept, &cached));
    assert!(cache.find_from_cache(DefinitionKind::Process, definitions[1].id()).is_none());
}

#[test]
fn new_deployment_populates_tiers_without_replay() {
    let fixture = DeploymentFixture::new("d1")
        .with_definition(DefinitionKind::Process, "order", 1)
        .with_definition(DefinitionKind::Case, "claim", 1);
    let deployment = fixture.deployment().clone();
    let deployer = Arc::new(CountingDeployer::new());
    let cache = DeploymentCache::builder(seeded_store([fixture]))
        .with_deployer(deployer.clone())
        .build()
        .unwrap();

    cache.deploy(&deployment).unwrap();

    assert_eq!(deployer.calls(), 1);
    assert_eq!(deployer.replays(), 0);
    assert!(cache
        .find_from_cache(DefinitionKind::Case, &definition_id("claim", 1, "d1"))
        .is_some());
    assert_eq!(cache.replay_count(), 0);
}

#[test]
fn pipeline_that_caches_nothing_is_internal_fault() {
    let store = seeded_store([DeploymentFixture::new("d1").with_definition(DefinitionKind::Case, "claim", 1)]);
    let cache = DeploymentCache::builder(store)
        .with_deployer(Arc::new(NoopDeployer))
        .build()
        .unwrap();

    let err = cache
        .find_deployed_by_id(DefinitionKind::Case, &definition_id("claim", 1, "d1"))
        .unwrap_err();
    assert!(matches!(err, CacheError::CacheRepairFailed { .. }));
    assert!(err.is_internal());
}

#[derive(Debug, Clone)]
enum Op {
    Add(u8),
    Remove(u8),
    Discard,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..16u8).prop_map(Op::Add),
        3 => (0..16u8).prop_map(Op::Remove),
        1 => Just(Op::Discard),
    ]
}

proptest! {
    #[test]
    fn prop_tier_tracks_add_and_remove(ops in proptest::collection::vec(op(), 1..64)) {
        let cache = DeploymentCache::new(Arc::new(InMemoryStore::new())).unwrap();
        let mut expected: HashMap<String, u32> = HashMap::new();

        for (step, op) in ops.iter().enumerate() {
            match op {
                Op::Add(n) => {
                    let id = format!("p{n}");
                    let version = step as u32;
                    cache.add_definition(Definition::new(
                        DefinitionKind::Process, id.as_str(), "p", version, "d", "p.bpmn",
                    ));
                    expected.insert(id, version);
                }
                Op::Remove(n) => {
                    let id = format!("p{n}");
                    let removed = cache.remove_definition(DefinitionKind::Process, &id).unwrap();
                    prop_assert_eq!(removed, expected.remove(&id).is_some());
                }
                Op::Discard => {
                    cache.discard_all(DefinitionKind::Process);
                    expected.clear();
                }
            }
        }

        for n in 0..16u8 {
            let id = format!("p{n}");
            let cached = cache.find_from_cache(DefinitionKind::Process, &id).map(|d| d.version());
            prop_assert_eq!(cached, expected.get(&id).copied());
        }
    }
}
