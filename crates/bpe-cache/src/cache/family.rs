//! Per-family view of the deployment cache

use super::DeploymentCache;
use crate::error::{CacheError, CacheResult};
use bpe_model::{Definition, DefinitionKind, ModelInstance};
use std::sync::Arc;

/// Operations of one definition family
///
/// ```rust,ignore
/// let order = cache.processes().find_deployed_latest_by_key("order")?;
/// let model = cache.processes().find_model(order.id())?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FamilyCache<'a> {
    cache: &'a DeploymentCache,
    kind: DefinitionKind,
}

impl<'a> FamilyCache<'a> {
    pub(super) fn new(cache: &'a DeploymentCache, kind: DefinitionKind) -> Self {
        Self { cache, kind }
    }

    /// Family this view operates on
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    /// Tier-only lookup; never consults storage
    #[must_use]
    pub fn find_from_cache(&self, id: &str) -> Option<Arc<Definition>> {
        self.cache.find_from_cache(self.kind, id)
    }

    /// # Errors
    /// See [`DeploymentCache::find_deployed_by_id`]
    pub fn find_deployed_by_id(&self, id: &str) -> CacheResult<Arc<Definition>> {
        self.cache.find_deployed_by_id(self.kind, id)
    }

    /// # Errors
    /// See [`DeploymentCache::find_deployed_latest_by_key`]
    pub fn find_deployed_latest_by_key(&self, key: &str) -> CacheResult<Arc<Definition>> {
        self.cache.find_deployed_latest_by_key(self.kind, key)
    }

    /// # Errors
    /// See [`DeploymentCache::find_deployed_latest_by_key_and_tenant`]
    pub fn find_deployed_latest_by_key_and_tenant(
        &self,
        key: &str,
        tenant_id: Option<&str>,
    ) -> CacheResult<Arc<Definition>> {
        self.cache
            .find_deployed_latest_by_key_and_tenant(self.kind, key, tenant_id)
    }

    /// Runs with elevated storage access
    ///
    /// # Errors
    /// See [`DeploymentCache::find_deployed_by_key_version_and_tenant`]
    pub fn find_deployed_by_key_version_and_tenant(
        &self,
        key: &str,
        version: u32,
        tenant_id: Option<&str>,
    ) -> CacheResult<Arc<Definition>> {
        self.cache
            .find_deployed_by_key_version_and_tenant(self.kind, key, version, tenant_id)
    }

    /// # Errors
    /// See [`DeploymentCache::find_deployed_by_key_and_version`]
    pub fn find_deployed_by_key_and_version(&self, key: &str, version: u32) -> CacheResult<Arc<Definition>> {
        self.cache
            .find_deployed_by_key_and_version(self.kind, key, version)
    }

    /// # Errors
    /// See [`DeploymentCache::find_deployed_by_deployment_and_key`]
    pub fn find_deployed_by_deployment_and_key(
        &self,
        deployment_id: &str,
        key: &str,
    ) -> CacheResult<Arc<Definition>> {
        self.cache
            .find_deployed_by_deployment_and_key(self.kind, deployment_id, key)
    }

    /// Tier first, resolving through storage on a miss
    ///
    /// # Errors
    /// See [`DeploymentCache::get_definition_by_id`]
    pub fn get_by_id(&self, id: &str) -> CacheResult<Arc<Definition>> {
        self.cache.get_definition_by_id(self.kind, id)
    }

    /// Put a definition of this family into the tier
    ///
    /// # Errors
    /// `InvalidArgument` if the definition belongs to another family
    pub fn add(&self, definition: Definition) -> CacheResult<Arc<Definition>> {
        if definition.kind() != self.kind {
            return Err(CacheError::InvalidArgument("definition kind for this family"));
        }
        Ok(self.cache.add_definition(definition))
    }

    /// Evict a definition of this family and its model
    ///
    /// # Errors
    /// See [`DeploymentCache::remove_definition`]
    pub fn remove(&self, id: &str) -> CacheResult<bool> {
        self.cache.remove_definition(self.kind, id)
    }

    /// Clear this family's tier and its model tier
    pub fn discard_all(&self) {
        self.cache.discard_all(self.kind);
    }

    /// Model of a definition of this family
    ///
    /// # Errors
    /// `InvalidArgument` for decision requirements definitions, which have
    /// no model tier; otherwise see [`DeploymentCache::find_model`]
    pub fn find_model(&self, id: &str) -> CacheResult<Arc<ModelInstance>> {
        let format = self
            .kind
            .model_format()
            .ok_or(CacheError::InvalidArgument("definition kind for model lookup"))?;
        self.cache.find_model(format, id)
    }
}
