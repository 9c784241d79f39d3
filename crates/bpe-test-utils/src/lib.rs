//! Testing utilities for the BPE cache workspace
//!
//! Shared fixtures and instrumented collaborators.

#![allow(missing_docs)]

use bpe_cache::{
    DeployContext, DeployError, Deployer, EvictionHook, HookError, InMemoryStore, JsonModelParser,
    ModelParser, ParseError, RegisteringDeployer,
};
use bpe_model::{Definition, DefinitionKind, Deployment, ModelElement, ModelFormat, ModelInstance, Resource};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Id used by fixtures: `key:version:deployment`
pub fn definition_id(key: &str, version: u32, deployment_id: &str) -> String {
    format!("{key}:{version}:{deployment_id}")
}

/// Resource name used by fixtures for a key of the given family
pub fn resource_name(kind: DefinitionKind, key: &str) -> String {
    let suffix = match kind {
        DefinitionKind::Process => "bpmn",
        DefinitionKind::Case => "cmmn",
        DefinitionKind::Decision | DefinitionKind::DecisionRequirements => "dmn",
    };
    format!("{key}.{suffix}")
}

/// JSON model bytes with one top-level element named after `key`
pub fn model_bytes(format: ModelFormat, key: &str) -> Vec<u8> {
    let element_type = match format {
        ModelFormat::Bpmn => "process",
        ModelFormat::Cmmn => "case",
        ModelFormat::Dmn => "decision",
    };
    let root = ModelElement::new(ModelInstance::ROOT_ELEMENT).with_child(
        ModelElement::new(element_type)
            .with_id(key)
            .with_child(ModelElement::new("startEvent").with_id(format!("{key}_start"))),
    );
    serde_json::to_vec(&root).unwrap()
}

/// Builder for a deployment plus its persisted definitions
#[derive(Debug, Clone)]
pub struct DeploymentFixture {
    deployment: Deployment,
    definitions: Vec<Definition>,
}

impl DeploymentFixture {
    pub fn new(deployment_id: &str) -> Self {
        Self {
            deployment: Deployment::new(deployment_id),
            definitions: Vec::new(),
        }
    }

    /// Owning tenant of the deployment and every definition added afterwards
    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.deployment = self.deployment.with_tenant(tenant_id);
        self
    }

    /// Definition with its own resource named after the key
    pub fn with_definition(self, kind: DefinitionKind, key: &str, version: u32) -> Self {
        let resource = resource_name(kind, key);
        self.with_definition_in(kind, key, version, &resource)
    }

    /// Definition parsed from the named resource; the resource is created
    /// with valid model bytes if not attached yet
    pub fn with_definition_in(mut self, kind: DefinitionKind, key: &str, version: u32, resource: &str) -> Self {
        let deployment_id = self.deployment.id().to_string();
        if self.deployment.resource(resource).is_none() {
            let format = ModelFormat::for_resource(resource).unwrap_or(ModelFormat::Bpmn);
            self.deployment
                .add_resource(Resource::new(deployment_id.as_str(), resource, model_bytes(format, key)));
        }

        let mut definition = Definition::new(
            kind,
            definition_id(key, version, &deployment_id),
            key,
            version,
            deployment_id.as_str(),
            resource,
        );
        if let Some(tenant) = self.deployment.tenant_id() {
            definition = definition.with_tenant(tenant);
        }
        self.definitions.push(definition);
        self
    }

    /// Resource with arbitrary bytes
    pub fn with_raw_resource(mut self, name: &str, bytes: &[u8]) -> Self {
        let resource = Resource::new(self.deployment.id(), name, bytes.to_vec());
        self.deployment.add_resource(resource);
        self
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    /// Persist into `store`, returning the definitions
    pub fn seed(self, store: &InMemoryStore) -> Vec<Definition> {
        store.insert_deployment(self.deployment);
        for definition in &self.definitions {
            store.insert_definition(definition.clone());
        }
        self.definitions
    }
}

/// Store seeded with every fixture
pub fn seeded_store(fixtures: impl IntoIterator<Item = DeploymentFixture>) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    for fixture in fixtures {
        fixture.seed(&store);
    }
    Arc::new(store)
}

/// Registering deployer that counts its runs, optionally slowed down
#[derive(Debug, Default)]
pub struct CountingDeployer {
    delay: Option<Duration>,
    calls: AtomicUsize,
    per_deployment: Mutex<HashMap<String, usize>>,
    replays: AtomicUsize,
}

impl CountingDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before registering, widening race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, deployment_id: &str) -> usize {
        self.per_deployment
            .lock()
            .get(deployment_id)
            .copied()
            .unwrap_or(0)
    }

    /// Runs that saw a replayed (not new) deployment
    pub fn replays(&self) -> usize {
        self.replays.load(Ordering::SeqCst)
    }
}

impl Deployer for CountingDeployer {
    fn name(&self) -> &str {
        "counting"
    }

    fn deploy(&self, deployment: &Deployment, context: &DeployContext<'_>) -> Result<(), DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !deployment.is_new() {
            self.replays.fetch_add(1, Ordering::SeqCst);
        }
        *self
            .per_deployment
            .lock()
            .entry(deployment.id().to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        RegisteringDeployer.deploy(deployment, context)
    }
}

/// Deployer that always fails
#[derive(Debug, Default)]
pub struct FailingDeployer {
    register_first: bool,
}

impl FailingDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the deployment's definitions before failing
    pub fn after_registering() -> Self {
        Self { register_first: true }
    }
}

impl Deployer for FailingDeployer {
    fn name(&self) -> &str {
        "failing"
    }

    fn deploy(&self, deployment: &Deployment, context: &DeployContext<'_>) -> Result<(), DeployError> {
        if self.register_first {
            RegisteringDeployer.deploy(deployment, context)?;
        }
        Err(DeployError::failed(self.name(), deployment.id(), "injected failure"))
    }
}

/// Deployer that runs but never registers anything
#[derive(Debug, Default)]
pub struct NoopDeployer;

impl Deployer for NoopDeployer {
    fn name(&self) -> &str {
        "noop"
    }

    fn deploy(&self, _deployment: &Deployment, _context: &DeployContext<'_>) -> Result<(), DeployError> {
        Ok(())
    }
}

/// JSON parser that counts its calls
#[derive(Debug)]
pub struct CountingParser {
    inner: JsonModelParser,
    calls: AtomicUsize,
}

impl CountingParser {
    pub fn new(format: ModelFormat) -> Self {
        Self {
            inner: JsonModelParser::new(format),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelParser for CountingParser {
    fn parse(&self, bytes: &[u8]) -> Result<ModelInstance, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(bytes)
    }
}

/// Parser that rejects every document
#[derive(Debug)]
pub struct FailingParser {
    format: ModelFormat,
}

impl FailingParser {
    pub fn new(format: ModelFormat) -> Self {
        Self { format }
    }
}

impl ModelParser for FailingParser {
    fn parse(&self, _bytes: &[u8]) -> Result<ModelInstance, ParseError> {
        Err(ParseError::invalid_model(self.format, "injected failure"))
    }
}

/// Eviction hook recording evicted ids, failing for selected ones
#[derive(Debug, Default)]
pub struct RecordingHook {
    fail_for: BTreeSet<String>,
    evicted: Mutex<Vec<String>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when any of these definition ids is evicted
    pub fn failing_for<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fail_for: ids.into_iter().map(Into::into).collect(),
            evicted: Mutex::new(Vec::new()),
        }
    }

    pub fn evicted(&self) -> Vec<String> {
        self.evicted.lock().clone()
    }
}

impl EvictionHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_evict(&self, definition: &Definition) -> Result<(), HookError> {
        self.evicted.lock().push(definition.id().to_string());
        if self.fail_for.contains(definition.id()) {
            return Err(HookError::new(self.name(), format!("refused '{}'", definition.id())));
        }
        Ok(())
    }
}
