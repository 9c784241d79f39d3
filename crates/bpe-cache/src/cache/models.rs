//! Lazy model loading
//!
//! Models are parsed on first access and cached by definition id. Two
//! threads missing the same model may both parse it; the last `put` wins.
//! Nothing is cached when the fetch or the parse fails, and a model is only
//! kept while its definition is cached.

use super::{CachedModel, DeploymentCache};
use crate::error::{CacheError, CacheResult, ModelLoadCause};
use crate::store::Access;
use bpe_model::{Definition, ModelFormat, ModelInstance};
use std::sync::Arc;

impl DeploymentCache {
    /// Model of the definition with the given id
    ///
    /// Resolves the owning definition first when the model is not cached.
    ///
    /// # Errors
    /// Lookup errors of the owning definition; `ModelLoadFailed` if the
    /// resource cannot be fetched or parsed
    pub fn find_model(&self, format: ModelFormat, definition_id: &str) -> CacheResult<Arc<ModelInstance>> {
        if definition_id.is_empty() {
            return Err(CacheError::InvalidArgument("definition id"));
        }
        if let Some(cached) = self.model_tier(format).get(definition_id) {
            return Ok(cached.model);
        }

        let definition = self.find_deployed_by_id(format.definition_kind(), definition_id)?;
        self.load_model(format, &definition)
    }

    /// Model of a definition already loaded by the caller
    ///
    /// Skips the storage lookup; the definition is resolved into its tier
    /// before the model is loaded.
    ///
    /// # Errors
    /// `InvalidArgument` for a family without models; resolution errors;
    /// `ModelLoadFailed` if the resource cannot be fetched or parsed
    pub fn find_model_for(&self, definition: &Definition) -> CacheResult<Arc<ModelInstance>> {
        let format = definition
            .kind()
            .model_format()
            .ok_or(CacheError::InvalidArgument("definition kind for model lookup"))?;
        if let Some(cached) = self.model_tier(format).get(definition.id()) {
            return Ok(cached.model);
        }
        let cached = self.resolve(definition.clone())?;
        self.load_model(format, &cached)
    }

    /// # Errors
    /// See [`find_model`](Self::find_model)
    pub fn find_bpmn_model(&self, process_definition_id: &str) -> CacheResult<Arc<ModelInstance>> {
        self.find_model(ModelFormat::Bpmn, process_definition_id)
    }

    /// # Errors
    /// See [`find_model`](Self::find_model)
    pub fn find_cmmn_model(&self, case_definition_id: &str) -> CacheResult<Arc<ModelInstance>> {
        self.find_model(ModelFormat::Cmmn, case_definition_id)
    }

    /// # Errors
    /// See [`find_model`](Self::find_model)
    pub fn find_dmn_model(&self, decision_definition_id: &str) -> CacheResult<Arc<ModelInstance>> {
        self.find_model(ModelFormat::Dmn, decision_definition_id)
    }

    fn load_model(&self, format: ModelFormat, definition: &Definition) -> CacheResult<Arc<ModelInstance>> {
        let failed = |source: ModelLoadCause| CacheError::ModelLoadFailed {
            format,
            kind: definition.kind(),
            definition_id: definition.id().to_string(),
            source,
        };

        let resource = self
            .store
            .find_resource(definition.deployment_id(), definition.resource_name(), Access::Elevated)
            .map_err(|e| failed(e.into()))?
            .ok_or_else(|| {
                failed(ModelLoadCause::MissingResource {
                    deployment_id: definition.deployment_id().to_string(),
                    resource_name: definition.resource_name().to_string(),
                })
            })?;

        let model = self
            .parsers
            .get(format)
            .parse(resource.bytes())
            .map_err(|e| failed(e.into()))?;

        let model = Arc::new(model);
        let tier = self.model_tier(format);
        tier.put(
            definition.id(),
            CachedModel {
                deployment_id: definition.deployment_id().to_string(),
                model: Arc::clone(&model),
            },
        );
        // definition removed while parsing
        if !self.definition_tier(definition.kind()).contains(definition.id()) {
            tier.remove(definition.id());
        }
        tracing::debug!(
            "loaded {} model for {} '{}' ({} elements)",
            format,
            definition.kind(),
            definition.id(),
            model.element_count()
        );
        Ok(model)
    }
}
