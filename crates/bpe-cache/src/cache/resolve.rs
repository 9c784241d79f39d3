//! Deployed-definition lookups and miss repair
//!
//! Every `find_deployed_*` lookup asks storage for the authoritative record
//! and passes it through [`DeploymentCache::resolve`]:
//!
//! 1. Tier hit: refresh the cached instance's state from the loaded copy
//!    and return the cached instance.
//! 2. Tier miss: take the cache-wide repair lock and check the tier again.
//! 3. Still missing: load the owning deployment, attach only the
//!    definition's source resource and replay it through the pipeline with
//!    elevated storage access.
//! 4. Read the tier once more; a miss now is `CacheRepairFailed`.
//!
//! Racing misses on the same id queue on the lock and find the tier
//! populated by whichever thread replayed first.

use super::DeploymentCache;
use crate::error::{CacheError, CacheResult};
use crate::store::{Access, DefinitionQuery};
use bpe_model::{Definition, DefinitionKind};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn require(value: &str, what: &'static str) -> CacheResult<()> {
    if value.is_empty() {
        Err(CacheError::InvalidArgument(what))
    } else {
        Ok(())
    }
}

impl DeploymentCache {
    /// Definition by id, resolved into its tier
    ///
    /// The store's unit-of-work local cache is consulted before the
    /// authoritative lookup.
    ///
    /// # Errors
    /// `NotFound` if storage has no such definition
    pub fn find_deployed_by_id(&self, kind: DefinitionKind, id: &str) -> CacheResult<Arc<Definition>> {
        require(id, "definition id")?;

        if let Some(local) = self.store.local_definition(kind, id) {
            return self.resolve(local);
        }
        self.find_and_resolve(kind, DefinitionQuery::ById(id.to_string()), Access::Checked)
    }

    /// Latest version of a key across every tenant
    ///
    /// # Errors
    /// `NotFound` if no version exists; `AmbiguousTenant` if more than one
    /// tenant has a version of the key
    pub fn find_deployed_latest_by_key(&self, kind: DefinitionKind, key: &str) -> CacheResult<Arc<Definition>> {
        require(key, "definition key")?;
        self.find_and_resolve(kind, DefinitionQuery::LatestByKey(key.to_string()), Access::Checked)
    }

    /// Latest version of a key for one tenant (`None` selects definitions
    /// without a tenant)
    ///
    /// # Errors
    /// `NotFound` if the tenant has no version of the key
    pub fn find_deployed_latest_by_key_and_tenant(
        &self,
        kind: DefinitionKind,
        key: &str,
        tenant_id: Option<&str>,
    ) -> CacheResult<Arc<Definition>> {
        require(key, "definition key")?;
        let query = DefinitionQuery::LatestByKeyAndTenant {
            key: key.to_string(),
            tenant_id: tenant_id.map(str::to_string),
        };
        self.find_and_resolve(kind, query, Access::Checked)
    }

    /// Exact key, version and tenant
    ///
    /// Runs with elevated storage access: callers already hold a reference
    /// to this exact version, typically from a running instance.
    ///
    /// # Errors
    /// `NotFound` if no definition matches
    pub fn find_deployed_by_key_version_and_tenant(
        &self,
        kind: DefinitionKind,
        key: &str,
        version: u32,
        tenant_id: Option<&str>,
    ) -> CacheResult<Arc<Definition>> {
        require(key, "definition key")?;
        let query = DefinitionQuery::ByKeyVersionAndTenant {
            key: key.to_string(),
            version,
            tenant_id: tenant_id.map(str::to_string),
        };
        self.find_and_resolve(kind, query, Access::Elevated)
    }

    /// Exact key and version across every tenant
    ///
    /// # Errors
    /// `NotFound` if no definition matches; `AmbiguousTenant` if the pair
    /// exists for more than one tenant
    pub fn find_deployed_by_key_and_version(
        &self,
        kind: DefinitionKind,
        key: &str,
        version: u32,
    ) -> CacheResult<Arc<Definition>> {
        require(key, "definition key")?;
        let query = DefinitionQuery::ByKeyAndVersion {
            key: key.to_string(),
            version,
        };
        self.find_and_resolve(kind, query, Access::Checked)
    }

    /// Definition of a key within one deployment
    ///
    /// # Errors
    /// `NotFound` if the deployment holds no such key
    pub fn find_deployed_by_deployment_and_key(
        &self,
        kind: DefinitionKind,
        deployment_id: &str,
        key: &str,
    ) -> CacheResult<Arc<Definition>> {
        require(deployment_id, "deployment id")?;
        require(key, "definition key")?;
        let query = DefinitionQuery::ByDeploymentAndKey {
            deployment_id: deployment_id.to_string(),
            key: key.to_string(),
        };
        self.find_and_resolve(kind, query, Access::Checked)
    }

    /// Tier first, falling back to [`find_deployed_by_id`](Self::find_deployed_by_id)
    ///
    /// # Errors
    /// As `find_deployed_by_id`
    pub fn get_definition_by_id(&self, kind: DefinitionKind, id: &str) -> CacheResult<Arc<Definition>> {
        match self.find_from_cache(kind, id) {
            Some(cached) => Ok(cached),
            None => self.find_deployed_by_id(kind, id),
        }
    }

    fn find_and_resolve(
        &self,
        kind: DefinitionKind,
        query: DefinitionQuery,
        access: Access,
    ) -> CacheResult<Arc<Definition>> {
        let loaded = self
            .store
            .find_definition(kind, &query, access)
            .map_err(|e| CacheError::from_store(kind, e))?
            .ok_or_else(|| CacheError::NotFound {
                kind,
                criteria: query.to_string(),
            })?;
        self.resolve(loaded)
    }

    /// Make sure an authoritatively loaded definition is in its tier and
    /// return the cached instance
    ///
    /// # Errors
    /// Replay failures propagate; `CacheRepairFailed` if the replay did not
    /// populate the tier
    pub fn resolve(&self, loaded: Definition) -> CacheResult<Arc<Definition>> {
        let kind = loaded.kind();
        let tier = self.definition_tier(kind);

        if let Some(cached) = tier.get(loaded.id()) {
            cached.refresh_from(&loaded);
            return Ok(cached);
        }

        let _guard = self.repair_lock.lock();
        if let Some(cached) = tier.get(loaded.id()) {
            tracing::debug!("{} '{}' repaired by a concurrent lookup", kind, loaded.id());
            cached.refresh_from(&loaded);
            return Ok(cached);
        }

        self.replay(&loaded)?;

        tier.get(loaded.id()).ok_or_else(|| {
            tracing::error!(
                "replay of deployment '{}' did not cache {} '{}'",
                loaded.deployment_id(),
                kind,
                loaded.id()
            );
            CacheError::CacheRepairFailed {
                kind,
                definition_id: loaded.id().to_string(),
                deployment_id: loaded.deployment_id().to_string(),
            }
        })
    }

    /// Replay the definition's deployment with only its source resource
    fn replay(&self, definition: &Definition) -> CacheResult<()> {
        let deployment_id = definition.deployment_id();
        let resource_name = definition.resource_name();

        let mut deployment = self
            .store
            .find_deployment(deployment_id, Access::Elevated)?
            .ok_or_else(|| CacheError::DeploymentNotFound {
                deployment_id: deployment_id.to_string(),
            })?;
        let resource = self
            .store
            .find_resource(deployment_id, resource_name, Access::Elevated)?
            .ok_or_else(|| CacheError::ResourceNotFound {
                deployment_id: deployment_id.to_string(),
                resource_name: resource_name.to_string(),
            })?;

        deployment.mark_replayed();
        deployment.clear_resources();
        deployment.add_resource(resource);

        tracing::debug!(
            "replaying deployment '{}' with resource '{}' for {} '{}'",
            deployment_id,
            resource_name,
            definition.kind(),
            definition.id()
        );
        self.replays.fetch_add(1, Ordering::Relaxed);
        self.run_pipeline(&deployment, Access::Elevated)?;
        tracing::info!("replayed deployment '{}'", deployment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{InMemoryStore, MockDefinitionStore};
    use bpe_model::{DefinitionState, Deployment, Resource};
    use mockall::predicate::eq;

    fn order(version: u32) -> Definition {
        Definition::new(
            DefinitionKind::Process,
            format!("order:{version}"),
            "order",
            version,
            "dep-1",
            "order.bpmn",
        )
    }

    fn seeded() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store.insert_deployment(
            Deployment::new("dep-1")
                .with_resource(Resource::new("dep-1", "order.bpmn", b"{}".to_vec())),
        );
        store.insert_definition(order(1));
        Arc::new(store)
    }

    #[test]
    fn miss_is_repaired_by_replay() {
        let cache = DeploymentCache::new(seeded()).unwrap();
        assert!(cache.find_from_cache(DefinitionKind::Process, "order:1").is_none());

        let found = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap();
        assert_eq!(found.key(), "order");
        assert_eq!(cache.replay_count(), 1);

        let cached = cache.find_from_cache(DefinitionKind::Process, "order:1").unwrap();
        assert!(Arc::ptr_eq(&found, &cached));
    }

    #[test]
    fn second_lookup_hits_tier() {
        let cache = DeploymentCache::new(seeded()).unwrap();
        let first = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap();
        let second = cache.find_deployed_latest_by_key(DefinitionKind::Process, "order").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.replay_count(), 1);
    }

    #[test]
    fn hit_refreshes_state_in_place() {
        let store = seeded();
        let cache = DeploymentCache::new(store.clone()).unwrap();
        let held = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap();
        assert!(!held.is_suspended());

        store.update_state(
            DefinitionKind::Process,
            "order:1",
            DefinitionState {
                revision: 2,
                suspended: true,
                history_time_to_live: None,
            },
        );
        cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap();
        assert!(held.is_suspended());
        assert_eq!(held.revision(), 2);
    }

    #[test]
    fn empty_arguments_are_rejected() {
        let cache = DeploymentCache::new(seeded()).unwrap();
        let err = cache.find_deployed_by_id(DefinitionKind::Process, "").unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument("definition id")));
        let err = cache
            .find_deployed_by_deployment_and_key(DefinitionKind::Process, "", "order")
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument("deployment id")));
    }

    #[test]
    fn not_found_names_the_criteria() {
        let cache = DeploymentCache::new(seeded()).unwrap();
        let err = cache
            .find_deployed_by_key_version_and_tenant(DefinitionKind::Process, "order", 9, Some("acme"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "no deployed process definition found with key = 'order', version = '9' and tenant-id = 'acme'"
        );
    }

    #[test]
    fn missing_deployment_is_internal() {
        let mut store = MockDefinitionStore::new();
        store
            .expect_local_definition()
            .returning(|_, _| None);
        store
            .expect_find_definition()
            .returning(|_, _, _| Ok(Some(order(1))));
        store
            .expect_find_deployment()
            .with(eq("dep-1"), eq(Access::Elevated))
            .times(1)
            .returning(|_, _| Ok(None));

        let cache = DeploymentCache::new(Arc::new(store)).unwrap();
        let err = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap_err();
        assert!(matches!(err, CacheError::DeploymentNotFound { ref deployment_id } if deployment_id == "dep-1"));
        assert!(err.is_internal());
    }

    #[test]
    fn missing_resource_is_internal() {
        let mut store = MockDefinitionStore::new();
        store.expect_local_definition().returning(|_, _| None);
        store
            .expect_find_definition()
            .returning(|_, _, _| Ok(Some(order(1))));
        store
            .expect_find_deployment()
            .returning(|id, _| Ok(Some(Deployment::new(id))));
        store
            .expect_find_resource()
            .with(eq("dep-1"), eq("order.bpmn"), eq(Access::Elevated))
            .returning(|_, _, _| Ok(None));

        let cache = DeploymentCache::new(Arc::new(store)).unwrap();
        let err = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap_err();
        assert!(matches!(err, CacheError::ResourceNotFound { .. }));
    }

    #[test]
    fn replay_that_caches_nothing_is_repair_failure() {
        let mut store = MockDefinitionStore::new();
        store.expect_local_definition().returning(|_, _| None);
        store
            .expect_find_definition()
            .returning(|_, _, _| Ok(Some(order(1))));
        store
            .expect_find_deployment()
            .returning(|id, _| Ok(Some(Deployment::new(id))));
        store
            .expect_find_resource()
            .returning(|dep, name, _| Ok(Some(Resource::new(dep, name, b"{}".to_vec()))));
        // storage lists nothing, so the registering deployer registers nothing
        store
            .expect_list_definitions_by_deployment()
            .returning(|_, _, _| Ok(Vec::new()));

        let cache = DeploymentCache::new(Arc::new(store)).unwrap();
        let err = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap_err();
        assert!(matches!(
            err,
            CacheError::CacheRepairFailed { kind: DefinitionKind::Process, ref definition_id, ref deployment_id }
                if definition_id == "order:1" && deployment_id == "dep-1"
        ));
        assert!(err.is_internal());
        assert!(!err.is_not_found());
    }

    #[test]
    fn storage_failure_propagates_without_caching() {
        let mut store = MockDefinitionStore::new();
        store
            .expect_find_definition()
            .returning(|_, _, _| Err(StoreError::backend("connection reset")));

        let cache = DeploymentCache::new(Arc::new(store)).unwrap();
        let err = cache
            .find_deployed_latest_by_key(DefinitionKind::Case, "claim")
            .unwrap_err();
        assert!(matches!(err, CacheError::Store(StoreError::Backend(_))));
        assert_eq!(cache.stats().definitions[1].entry_count, 0);
    }

    #[test]
    fn local_definition_skips_authoritative_lookup() {
        let mut store = MockDefinitionStore::new();
        store
            .expect_local_definition()
            .returning(|_, _| Some(order(1)));
        store.expect_find_definition().never();
        store
            .expect_find_deployment()
            .returning(|id, _| Ok(Some(Deployment::new(id))));
        store
            .expect_find_resource()
            .returning(|dep, name, _| Ok(Some(Resource::new(dep, name, b"{}".to_vec()))));
        store
            .expect_list_definitions_by_deployment()
            .returning(|kind, _, _| {
                Ok(if kind == DefinitionKind::Process {
                    vec![order(1)]
                } else {
                    Vec::new()
                })
            });

        let cache = DeploymentCache::new(Arc::new(store)).unwrap();
        let found = cache.find_deployed_by_id(DefinitionKind::Process, "order:1").unwrap();
        assert_eq!(found.id(), "order:1");
    }

    #[test]
    fn get_by_id_prefers_tier() {
        let mut store = MockDefinitionStore::new();
        store.expect_find_definition().never();
        let cache = DeploymentCache::new(Arc::new(store)).unwrap();
        cache.add_definition(order(1));

        let found = cache.get_definition_by_id(DefinitionKind::Process, "order:1").unwrap();
        assert_eq!(found.version(), 1);
    }
}
