//! Published, versioned definitions
//!
//! A [`Definition`] has two halves: identity fields that never change once
//! the definition is deployed, and a small [`DefinitionState`] that storage
//! may update (suspension, revision, history retention). The state sits
//! behind a lock so that every holder of a shared `Arc<Definition>` observes
//! a refresh.

use crate::kind::DefinitionKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Mutable part of a definition, refreshed from storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionState {
    /// Storage revision of the record
    pub revision: u32,
    /// Whether new instances may be started
    pub suspended: bool,
    /// History retention in days
    pub history_time_to_live: Option<u32>,
}

/// A published definition of one family
#[derive(Debug)]
pub struct Definition {
    kind: DefinitionKind,
    id: String,
    key: String,
    version: u32,
    tenant_id: Option<String>,
    deployment_id: String,
    resource_name: String,
    name: Option<String>,
    state: RwLock<DefinitionState>,
}

impl Definition {
    /// Create a definition without tenant, name or state
    #[must_use]
    pub fn new(
        kind: DefinitionKind,
        id: impl Into<String>,
        key: impl Into<String>,
        version: u32,
        deployment_id: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            key: key.into(),
            version,
            tenant_id: None,
            deployment_id: deployment_id.into(),
            resource_name: resource_name.into(),
            name: None,
            state: RwLock::new(DefinitionState::default()),
        }
    }

    /// With owning tenant
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// With display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With initial mutable state
    #[must_use]
    pub fn with_state(self, state: DefinitionState) -> Self {
        *self.state.write() = state;
        self
    }

    /// Family of the definition
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    /// Unique definition id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Key shared by every version
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Version within the key and tenant
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Owning tenant, if any
    #[inline]
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Deployment the definition was deployed with
    #[inline]
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Name of the deployment resource this definition was parsed from
    #[inline]
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Snapshot of the mutable state
    #[must_use]
    pub fn state(&self) -> DefinitionState {
        self.state.read().clone()
    }

    /// Check if the definition is suspended
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.state.read().suspended
    }

    /// Revision of the mutable state
    #[must_use]
    pub fn revision(&self) -> u32 {
        self.state.read().revision
    }

    /// Replace the mutable state
    pub fn set_state(&self, state: DefinitionState) {
        *self.state.write() = state;
    }

    /// Copy the mutable state of a freshly loaded copy of this definition
    ///
    /// Identity fields are left untouched; callers only pass copies with the
    /// same id.
    pub fn refresh_from(&self, loaded: &Definition) {
        debug_assert_eq!(self.id, loaded.id);
        let fresh = loaded.state();
        *self.state.write() = fresh;
    }
}

impl Clone for Definition {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            id: self.id.clone(),
            key: self.key.clone(),
            version: self.version,
            tenant_id: self.tenant_id.clone(),
            deployment_id: self.deployment_id.clone(),
            resource_name: self.resource_name.clone(),
            name: self.name.clone(),
            state: RwLock::new(self.state()),
        }
    }
}

impl PartialEq for Definition {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.id == other.id
            && self.key == other.key
            && self.version == other.version
            && self.tenant_id == other.tenant_id
            && self.deployment_id == other.deployment_id
            && self.resource_name == other.resource_name
            && self.name == other.name
            && self.state() == other.state()
    }
}

impl Eq for Definition {}
