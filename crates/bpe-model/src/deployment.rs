//! Deployments and their resources

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named byte blob belonging to exactly one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    deployment_id: String,
    name: String,
    bytes: Arc<[u8]>,
}

impl Resource {
    /// Create resource
    #[must_use]
    pub fn new(
        deployment_id: impl Into<String>,
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Owning deployment id
    #[inline]
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Resource name, unique within the deployment
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw resource content
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the content is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Root unit of publication
///
/// A deployment loaded back from storage for replay is marked with
/// [`Deployment::mark_replayed`] so deployers skip persisting it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    id: String,
    name: Option<String>,
    tenant_id: Option<String>,
    deployment_time: DateTime<Utc>,
    is_new: bool,
    resources: BTreeMap<String, Resource>,
}

impl Deployment {
    /// Create a fresh deployment, stamped now
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            tenant_id: None,
            deployment_time: Utc::now(),
            is_new: true,
            resources: BTreeMap::new(),
        }
    }

    /// With display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With owning tenant
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// With deployment timestamp
    #[must_use]
    pub fn with_deployment_time(mut self, time: DateTime<Utc>) -> Self {
        self.deployment_time = time;
        self
    }

    /// With resource attached
    #[must_use]
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.add_resource(resource);
        self
    }

    /// Deployment id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, if any
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning tenant, if any
    #[inline]
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Deployment timestamp
    #[inline]
    #[must_use]
    pub fn deployment_time(&self) -> DateTime<Utc> {
        self.deployment_time
    }

    /// Whether this deployment is being published for the first time
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Mark as already persisted
    pub fn mark_replayed(&mut self) {
        self.is_new = false;
    }

    /// Attach a resource, replacing any resource of the same name
    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    /// Detach all resources
    pub fn clear_resources(&mut self) {
        self.resources.clear();
    }

    /// Resource by name
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Attached resources, ordered by name
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Names of attached resources, in order
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_deployment_is_new() {
        let deployment = Deployment::new("dep-1").with_name("billing").with_tenant("acme");
        assert!(deployment.is_new());
        assert_eq!(deployment.name(), Some("billing"));
        assert_eq!(deployment.tenant_id(), Some("acme"));
    }

    #[test]
    fn resources_replace_by_name() {
        let mut deployment = Deployment::new("dep-1");
        deployment.add_resource(Resource::new("dep-1", "a.bpmn", b"one".to_vec()));
        deployment.add_resource(Resource::new("dep-1", "a.bpmn", b"two".to_vec()));

        assert_eq!(deployment.resources().count(), 1);
        assert_eq!(deployment.resource("a.bpmn").unwrap().bytes(), b"two");
    }

    #[test]
    fn resource_len() {
        let resource = Resource::new("dep-1", "x.dmn", Vec::<u8>::new());
        assert!(resource.is_empty());
        assert_eq!(resource.len(), 0);
        assert_eq!(resource.deployment_id(), "dep-1");
    }
}
