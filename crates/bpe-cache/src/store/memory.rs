//! In-memory storage backend
//!
//! Thread-safe [`DefinitionStore`] over `RwLock`ed maps. Used by the
//! operator binary and by tests; it is also a reference for the semantics a
//! durable backend must provide.

use super::{Access, DefinitionQuery, DefinitionStore, StoreResult};
use crate::error::StoreError;
use bpe_model::{Definition, DefinitionKind, DefinitionState, Deployment, Resource};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Storage backend held entirely in memory
///
/// Tenant authorization is off unless [`InMemoryStore::with_authorized_tenants`]
/// is used. With it, a [`Access::Checked`] call that would return a record
/// of another tenant fails with [`StoreError::AccessDenied`]. Records without
/// a tenant are visible to everyone.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    deployments: RwLock<HashMap<String, Deployment>>,
    definitions: [RwLock<BTreeMap<String, Definition>>; 4],
    local: DashMap<(DefinitionKind, String), Definition>,
    authorized_tenants: Option<BTreeSet<String>>,
}

impl InMemoryStore {
    /// Create empty store without tenant checks
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict checked access to the given tenants
    #[must_use]
    pub fn with_authorized_tenants<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_tenants = Some(tenants.into_iter().map(Into::into).collect());
        self
    }

    /// Persist a deployment together with its attached resources
    pub fn insert_deployment(&self, deployment: Deployment) {
        self.deployments
            .write()
            .insert(deployment.id().to_string(), deployment);
    }

    /// Persist a definition, replacing any record with the same id
    pub fn insert_definition(&self, definition: Definition) {
        self.definitions[definition.kind().index()]
            .write()
            .insert(definition.id().to_string(), definition);
    }

    /// Update the mutable state of a persisted definition
    ///
    /// Returns `false` when no such definition exists.
    pub fn update_state(&self, kind: DefinitionKind, id: &str, state: DefinitionState) -> bool {
        match self.definitions[kind.index()].read().get(id) {
            Some(definition) => {
                definition.set_state(state);
                true
            }
            None => false,
        }
    }

    /// Delete a deployment with its resources and definitions
    ///
    /// Returns the number of definitions deleted.
    pub fn delete_deployment(&self, deployment_id: &str) -> usize {
        self.deployments.write().remove(deployment_id);
        self.local
            .retain(|_, definition| definition.deployment_id() != deployment_id);
        self.definitions
            .iter()
            .map(|family| {
                let mut family = family.write();
                let before = family.len();
                family.retain(|_, definition| definition.deployment_id() != deployment_id);
                before - family.len()
            })
            .sum()
    }

    /// Load a persisted definition into the unit-of-work local cache
    ///
    /// Returns `false` when no such definition exists.
    pub fn load_local(&self, kind: DefinitionKind, id: &str) -> bool {
        let loaded = self.definitions[kind.index()].read().get(id).cloned();
        match loaded {
            Some(definition) => {
                self.local.insert((kind, id.to_string()), definition);
                true
            }
            None => false,
        }
    }

    /// Forget everything in the unit-of-work local cache
    pub fn clear_local(&self) {
        self.local.clear();
    }

    /// Number of persisted definitions of one family
    #[must_use]
    pub fn definition_count(&self, kind: DefinitionKind) -> usize {
        self.definitions[kind.index()].read().len()
    }

    /// Number of persisted deployments
    #[must_use]
    pub fn deployment_count(&self) -> usize {
        self.deployments.read().len()
    }

    fn is_authorized(&self, tenant_id: Option<&str>, access: Access) -> bool {
        match (&self.authorized_tenants, tenant_id, access) {
            (_, _, Access::Elevated) | (None, _, _) | (_, None, _) => true,
            (Some(allowed), Some(tenant), Access::Checked) => allowed.contains(tenant),
        }
    }

    fn authorize(&self, tenant_id: Option<&str>, access: Access, what: &str) -> StoreResult<()> {
        if self.is_authorized(tenant_id, access) {
            Ok(())
        } else {
            Err(StoreError::AccessDenied(format!(
                "{what} belongs to tenant '{}'",
                tenant_id.unwrap_or_default()
            )))
        }
    }
}

/// Highest version per tenant among `candidates`
fn latest_per_tenant<'a>(
    candidates: impl Iterator<Item = &'a Definition>,
) -> BTreeMap<Option<&'a str>, &'a Definition> {
    let mut latest: BTreeMap<Option<&str>, &Definition> = BTreeMap::new();
    for definition in candidates {
        latest
            .entry(definition.tenant_id())
            .and_modify(|current| {
                if definition.version() > current.version() {
                    *current = definition;
                }
            })
            .or_insert(definition);
    }
    latest
}

impl DefinitionStore for InMemoryStore {
    fn local_definition(&self, kind: DefinitionKind, id: &str) -> Option<Definition> {
        self.local
            .get(&(kind, id.to_string()))
            .map(|entry| entry.value().clone())
    }

    fn find_definition(
        &self,
        kind: DefinitionKind,
        query: &DefinitionQuery,
        access: Access,
    ) -> StoreResult<Option<Definition>> {
        let family = self.definitions[kind.index()].read();

        let found = match query {
            DefinitionQuery::ById(id) => family.get(id),
            DefinitionQuery::LatestByKey(_)
            | DefinitionQuery::LatestByKeyAndTenant { .. }
            | DefinitionQuery::ByKeyAndVersion { .. } => {
                let latest = latest_per_tenant(family.values().filter(|d| query.matches(d)));
                if query.spans_tenants() && latest.len() > 1 {
                    return Err(StoreError::AmbiguousTenant {
                        key: query.key().unwrap_or_default().to_string(),
                    });
                }
                latest.into_values().next()
            }
            DefinitionQuery::ByKeyVersionAndTenant { .. } => {
                family.values().find(|d| query.matches(d))
            }
            DefinitionQuery::ByDeploymentAndKey { .. } => family
                .values()
                .filter(|d| query.matches(d))
                .max_by_key(|d| d.version()),
        };

        match found {
            Some(definition) => {
                self.authorize(definition.tenant_id(), access, definition.id())?;
                Ok(Some(definition.clone()))
            }
            None => Ok(None),
        }
    }

    fn list_definitions_by_deployment(
        &self,
        kind: DefinitionKind,
        deployment_id: &str,
        access: Access,
    ) -> StoreResult<Vec<Definition>> {
        Ok(self.definitions[kind.index()]
            .read()
            .values()
            .filter(|d| d.deployment_id() == deployment_id)
            .filter(|d| self.is_authorized(d.tenant_id(), access))
            .cloned()
            .collect())
    }

    fn find_deployment(&self, deployment_id: &str, access: Access) -> StoreResult<Option<Deployment>> {
        let deployments = self.deployments.read();
        let Some(deployment) = deployments.get(deployment_id) else {
            return Ok(None);
        };
        self.authorize(deployment.tenant_id(), access, deployment_id)?;

        let mut record = deployment.clone();
        record.clear_resources();
        Ok(Some(record))
    }

    fn find_resource(
        &self,
        deployment_id: &str,
        resource_name: &str,
        access: Access,
    ) -> StoreResult<Option<Resource>> {
        let deployments = self.deployments.read();
        let Some(deployment) = deployments.get(deployment_id) else {
            return Ok(None);
        };
        self.authorize(deployment.tenant_id(), access, deployment_id)?;
        Ok(deployment.resource(resource_name).cloned())
    }
}
