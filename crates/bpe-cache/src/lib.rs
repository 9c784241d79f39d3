//! Deployment cache for a business-process engine
//!
//! Keeps recently used process, case, decision and decision requirements
//! definitions, plus their parsed BPMN, CMMN and DMN models, in memory so
//! request handling does not keep hitting storage or re-parsing documents.
//!
//! # Core Operations
//!
//! - **Lookup**: `find_deployed_*` fetches the authoritative record and
//!   resolves it into its tier, replaying the owning deployment on a miss
//! - **Models**: `find_model` parses a definition's source resource on first
//!   access
//! - **Invalidation**: `remove_definition`, `discard_all` and the cascading
//!   `remove_deployment`
//!
//! # Example
//!
//! ```rust,ignore
//! use bpe_cache::prelude::*;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let cache = DeploymentCache::new(store)?;
//!
//! let order = cache.processes().find_deployed_latest_by_key("order")?;
//! let model = cache.find_model_for(&order)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod bounded;
pub mod cache;
pub mod config;
pub mod deployer;
pub mod error;
pub mod hook;
pub mod parser;
pub mod store;

pub use bounded::{BoundedCache, TierStats};
pub use cache::{CacheStats, DeploymentCache, DeploymentCacheBuilder, FamilyCache, RemovalReport};
pub use config::{CacheConfig, Eviction, DEFAULT_CAPACITY};
pub use deployer::{DeployContext, Deployer, DeployerPipeline, RegisteringDeployer};
pub use error::{
    CacheError, CacheResult, ConfigError, DeployError, HookError, ModelLoadCause, ParseError, StoreError,
};
pub use hook::EvictionHook;
pub use parser::{JsonModelParser, ModelParser, ParserSet};
pub use store::{Access, DefinitionQuery, DefinitionStore, InMemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the deployment cache
    pub use crate::cache::{DeploymentCache, FamilyCache, RemovalReport};
    pub use crate::config::CacheConfig;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::store::{Access, DefinitionStore, InMemoryStore};
    pub use bpe_model::{Definition, DefinitionKind, Deployment, ModelFormat, ModelInstance, Resource};
    pub use std::sync::Arc;
}
