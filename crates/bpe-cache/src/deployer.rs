//! Deployer pipeline
//!
//! Deployers turn a [`Deployment`] into cached definitions. The same pipeline
//! runs for genuinely new deployments and for replays that repair a cache
//! miss; a replayed deployment has [`Deployment::is_new`] set to `false` and
//! deployers must not persist anything for it.
//!
//! Deployers put definitions into the cache through
//! [`DeployContext::register`] so that a failed run can be rolled back.

use crate::cache::DeploymentCache;
use crate::error::DeployError;
use crate::store::{Access, DefinitionStore};
use bpe_model::{Definition, DefinitionKind, Deployment, ModelFormat};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// One stage of the deployer pipeline
pub trait Deployer: Send + Sync {
    /// Stage name used in logs and errors
    fn name(&self) -> &str;

    /// Process one deployment
    ///
    /// # Errors
    /// Any error aborts the pipeline and rolls back registered entries
    fn deploy(&self, deployment: &Deployment, context: &DeployContext<'_>) -> Result<(), DeployError>;
}

/// Per-run state handed to every deployer
pub struct DeployContext<'a> {
    cache: &'a DeploymentCache,
    access: Access,
    inserted: Mutex<Vec<(DefinitionKind, String)>>,
}

impl<'a> DeployContext<'a> {
    pub(crate) fn new(cache: &'a DeploymentCache, access: Access) -> Self {
        Self {
            cache,
            access,
            inserted: Mutex::new(Vec::new()),
        }
    }

    /// Access level storage calls of this run must use
    #[inline]
    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Storage backend of the cache being populated
    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn DefinitionStore {
        self.cache.store()
    }

    /// Cache being populated
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &DeploymentCache {
        self.cache
    }

    /// Put a definition into its tier
    ///
    /// A definition already cached keeps its instance and takes over the
    /// state of `definition`; otherwise `definition` is inserted and
    /// remembered for rollback.
    pub fn register(&self, definition: Definition) -> Arc<Definition> {
        let kind = definition.kind();
        if let Some(cached) = self.cache.find_from_cache(kind, definition.id()) {
            cached.refresh_from(&definition);
            return cached;
        }
        let id = definition.id().to_string();
        let shared = self.cache.add_definition(definition);
        self.inserted.lock().push((kind, id));
        shared
    }

    /// Number of definitions inserted by this run so far
    #[must_use]
    pub fn inserted_count(&self) -> usize {
        self.inserted.lock().len()
    }

    pub(crate) fn into_inserted(self) -> Vec<(DefinitionKind, String)> {
        self.inserted.into_inner()
    }
}

impl fmt::Debug for DeployContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployContext")
            .field("access", &self.access)
            .field("inserted", &self.inserted_count())
            .finish()
    }
}

/// Ordered list of deployers
#[derive(Clone, Default)]
pub struct DeployerPipeline {
    deployers: Vec<Arc<dyn Deployer>>,
}

impl DeployerPipeline {
    /// Create empty pipeline
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline holding only [`RegisteringDeployer`]
    #[must_use]
    pub fn registering() -> Self {
        Self::new().with_deployer(Arc::new(RegisteringDeployer))
    }

    /// With deployer appended
    #[must_use]
    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.push(deployer);
        self
    }

    /// Append a deployer
    pub fn push(&mut self, deployer: Arc<dyn Deployer>) {
        self.deployers.push(deployer);
    }

    /// Number of deployers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.deployers.len()
    }

    /// Check if no deployer is configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployers.is_empty()
    }

    /// Stage names in run order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.deployers.iter().map(|d| d.name()).collect()
    }

    /// Run every deployer in order, stopping at the first failure
    pub(crate) fn run(&self, deployment: &Deployment, context: &DeployContext<'_>) -> Result<(), DeployError> {
        for deployer in &self.deployers {
            tracing::debug!(
                "deployer '{}' processing deployment '{}'",
                deployer.name(),
                deployment.id()
            );
            deployer.deploy(deployment, context)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DeployerPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployerPipeline")
            .field("deployers", &self.names())
            .finish()
    }
}

/// Deployer that registers already persisted definitions
///
/// For every attached resource it picks the format by resource name, lists
/// the persisted definitions of the produced families in the deployment and
/// registers those whose source is that resource. It never writes to
/// storage, so new deployments must be persisted before they are deployed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisteringDeployer;

impl Deployer for RegisteringDeployer {
    fn name(&self) -> &str {
        "registering"
    }

    fn deploy(&self, deployment: &Deployment, context: &DeployContext<'_>) -> Result<(), DeployError> {
        for resource in deployment.resources() {
            let Some(format) = ModelFormat::for_resource(resource.name()) else {
                tracing::debug!("skipping resource '{}': unknown format", resource.name());
                continue;
            };

            for &kind in format.produced_kinds() {
                let persisted = context.store().list_definitions_by_deployment(
                    kind,
                    deployment.id(),
                    context.access(),
                )?;
                persisted
                    .into_iter()
                    .filter(|d| d.resource_name() == resource.name())
                    .for_each(|d| {
                        context.register(d);
                    });
            }
        }
        Ok(())
    }
}
