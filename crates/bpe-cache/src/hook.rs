//! Eviction observers
//!
//! Hooks run after a definition and its model have left the cache, so a
//! hook failure never leaves an orphaned entry behind.

use crate::error::HookError;
use bpe_model::Definition;

/// Observer notified when a definition is evicted by
/// [`DeploymentCache::remove_definition`](crate::DeploymentCache::remove_definition)
pub trait EvictionHook: Send + Sync {
    /// Hook name used in error messages
    fn name(&self) -> &str;

    /// Called once per evicted definition
    ///
    /// # Errors
    /// A failure is reported to the caller as `CacheError::EvictionFailed`
    fn on_evict(&self, definition: &Definition) -> Result<(), HookError>;
}
