//! Storage contract for authoritative lookups
//!
//! The deployment cache never owns the authoritative copy of anything. It
//! consults a [`DefinitionStore`] on a tier miss, when replaying a
//! deployment, when fetching a model resource and when enumerating the
//! definitions of a removed deployment.
//!
//! Every call carries an explicit [`Access`] level. Lookups made on behalf
//! of a caller use [`Access::Checked`]; work that reconstructs previously
//! approved state (replay, model resource fetch, invalidation listing) uses
//! [`Access::Elevated`].

mod memory;

pub use memory::InMemoryStore;

use crate::error::StoreError;
use bpe_model::{Definition, DefinitionKind, Deployment, Resource};
use std::fmt;

/// Storage access level for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Enforce the store's authorization rules
    Checked,
    /// Skip authorization checks
    Elevated,
}

impl Access {
    /// Check if authorization checks are bypassed
    #[inline]
    #[must_use]
    pub fn is_elevated(self) -> bool {
        matches!(self, Access::Elevated)
    }
}

/// Criteria for a single-definition lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefinitionQuery {
    /// Exact identifier
    ById(String),
    /// Latest version of a key, across all tenants
    LatestByKey(String),
    /// Latest version of a key for one tenant (`None` = no tenant)
    LatestByKeyAndTenant {
        key: String,
        tenant_id: Option<String>,
    },
    /// Exact key, version and tenant (`None` = no tenant)
    ByKeyVersionAndTenant {
        key: String,
        version: u32,
        tenant_id: Option<String>,
    },
    /// Exact key and version, across all tenants
    ByKeyAndVersion { key: String, version: u32 },
    /// Key within one deployment
    ByDeploymentAndKey { deployment_id: String, key: String },
}

impl DefinitionQuery {
    /// Key the query is about, if any
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            DefinitionQuery::ById(_) => None,
            DefinitionQuery::LatestByKey(key)
            | DefinitionQuery::LatestByKeyAndTenant { key, .. }
            | DefinitionQuery::ByKeyVersionAndTenant { key, .. }
            | DefinitionQuery::ByKeyAndVersion { key, .. }
            | DefinitionQuery::ByDeploymentAndKey { key, .. } => Some(key),
        }
    }

    /// Whether the query spans every tenant and may therefore be ambiguous
    #[must_use]
    pub fn spans_tenants(&self) -> bool {
        matches!(
            self,
            DefinitionQuery::LatestByKey(_) | DefinitionQuery::ByKeyAndVersion { .. }
        )
    }

    /// Check a definition against the query's exact criteria
    ///
    /// "Latest" queries match every version of the key; picking the latest
    /// is the store's job.
    #[must_use]
    pub fn matches(&self, definition: &Definition) -> bool {
        match self {
            DefinitionQuery::ById(id) => definition.id() == id,
            DefinitionQuery::LatestByKey(key) => definition.key() == key,
            DefinitionQuery::LatestByKeyAndTenant { key, tenant_id } => {
                definition.key() == key && definition.tenant_id() == tenant_id.as_deref()
            }
            DefinitionQuery::ByKeyVersionAndTenant {
                key,
                version,
                tenant_id,
            } => {
                definition.key() == key
                    && definition.version() == *version
                    && definition.tenant_id() == tenant_id.as_deref()
            }
            DefinitionQuery::ByKeyAndVersion { key, version } => {
                definition.key() == key && definition.version() == *version
            }
            DefinitionQuery::ByDeploymentAndKey { deployment_id, key } => {
                definition.deployment_id() == deployment_id && definition.key() == key
            }
        }
    }
}

fn fmt_tenant(tenant_id: &Option<String>) -> &str {
    tenant_id.as_deref().unwrap_or("<none>")
}

impl fmt::Display for DefinitionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionQuery::ById(id) => write!(f, "id '{id}'"),
            DefinitionQuery::LatestByKey(key) => write!(f, "key '{key}'"),
            DefinitionQuery::LatestByKeyAndTenant { key, tenant_id } => {
                write!(f, "key '{key}' and tenant-id '{}'", fmt_tenant(tenant_id))
            }
            DefinitionQuery::ByKeyVersionAndTenant {
                key,
                version,
                tenant_id,
            } => write!(
                f,
                "key = '{key}', version = '{version}' and tenant-id = '{}'",
                fmt_tenant(tenant_id)
            ),
            DefinitionQuery::ByKeyAndVersion { key, version } => {
                write!(f, "key = '{key}' and version = '{version}'")
            }
            DefinitionQuery::ByDeploymentAndKey { deployment_id, key } => {
                write!(f, "key = '{key}' in deployment = '{deployment_id}'")
            }
        }
    }
}

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Authoritative storage consulted by the deployment cache
///
/// Implementations must be safe to call from many threads at once. Calls
/// are synchronous and may block on I/O.
#[cfg_attr(test, mockall::automock)]
pub trait DefinitionStore: Send + Sync {
    /// Definition already loaded by the current unit of work, if the store
    /// keeps such a local cache
    fn local_definition(&self, _kind: DefinitionKind, _id: &str) -> Option<Definition> {
        None
    }

    /// Single-definition lookup
    ///
    /// # Errors
    /// `StoreError::AmbiguousTenant` when a tenant-spanning query matches
    /// more than one tenant
    fn find_definition(
        &self,
        kind: DefinitionKind,
        query: &DefinitionQuery,
        access: Access,
    ) -> StoreResult<Option<Definition>>;

    /// Every definition of a family belonging to a deployment
    fn list_definitions_by_deployment(
        &self,
        kind: DefinitionKind,
        deployment_id: &str,
        access: Access,
    ) -> StoreResult<Vec<Definition>>;

    /// Deployment record without resources attached
    fn find_deployment(&self, deployment_id: &str, access: Access) -> StoreResult<Option<Deployment>>;

    /// One named resource of a deployment
    fn find_resource(
        &self,
        deployment_id: &str,
        resource_name: &str,
        access: Access,
    ) -> StoreResult<Option<Resource>>;
}
