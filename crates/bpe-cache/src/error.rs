//! Error types for the deployment cache
//!
//! Provides error handling for:
//! - Storage lookups (authoritative records)
//! - Deployer pipeline runs (replay and fresh deployments)
//! - Model parsing
//! - Eviction hooks
//! - Configuration loading
//!
//! Every cache operation returns [`CacheError`]. Use [`CacheError::is_not_found`]
//! and [`CacheError::is_internal`] to tell legitimate absence apart from a
//! consistency fault.

use bpe_model::{DefinitionKind, ModelFormat};
use std::path::PathBuf;

/// Errors raised by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Untenant-scoped query matched definitions of more than one tenant
    #[error("definitions with key '{key}' exist for more than one tenant")]
    AmbiguousTenant { key: String },

    /// Caller is not authorized for the requested record
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Backend failure (connection, query, decoding)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Errors raised by a deployer
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A deployer rejected or failed on the deployment
    #[error("deployer '{deployer}' failed on deployment '{deployment_id}': {message}")]
    Failed {
        deployer: String,
        deployment_id: String,
        message: String,
    },

    /// Storage failure while deploying
    #[error("storage error during deployment: {0}")]
    Store(#[from] StoreError),
}

impl DeployError {
    /// Create deployer failure
    pub fn failed(
        deployer: impl Into<String>,
        deployment_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Failed {
            deployer: deployer.into(),
            deployment_id: deployment_id.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a model parser
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Bytes are not a well-formed document
    #[error("malformed {format} document: {message}")]
    Malformed { format: ModelFormat, message: String },

    /// Document is well formed but not a model of the expected shape
    #[error("invalid {format} model: {message}")]
    InvalidModel { format: ModelFormat, message: String },
}

impl ParseError {
    /// Create malformed-document error
    pub fn malformed(format: ModelFormat, message: impl Into<String>) -> Self {
        Self::Malformed {
            format,
            message: message.into(),
        }
    }

    /// Create invalid-model error
    pub fn invalid_model(format: ModelFormat, message: impl Into<String>) -> Self {
        Self::InvalidModel {
            format,
            message: message.into(),
        }
    }
}

/// Why a model could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadCause {
    /// Resource not present in storage
    #[error("resource '{resource_name}' not found in deployment '{deployment_id}'")]
    MissingResource {
        deployment_id: String,
        resource_name: String,
    },

    /// Storage failed while fetching the resource
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Parser rejected the resource
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Error raised by an eviction hook
#[derive(Debug, thiserror::Error)]
#[error("eviction hook '{hook}' failed: {message}")]
pub struct HookError {
    /// Name of the failing hook
    pub hook: String,
    /// Failure message
    pub message: String,
}

impl HookError {
    /// Create hook error
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration syntax: {0}")]
    Syntax(#[from] toml::de::Error),

    #[error("configuration could not be rendered: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the deployment cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Caller passed an empty identifier or key
    #[error("invalid {0}")]
    InvalidArgument(&'static str),

    /// Storage holds no definition matching the criteria
    #[error("no deployed {kind} found with {criteria}")]
    NotFound {
        kind: DefinitionKind,
        criteria: String,
    },

    /// Untenant-scoped lookup matched more than one tenant
    #[error("{kind}s with key '{key}' exist for more than one tenant; specify a tenant id")]
    AmbiguousTenant { kind: DefinitionKind, key: String },

    /// Storage refused the lookup
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Owning deployment vanished before it could be replayed
    #[error("deployment '{deployment_id}' not found")]
    DeploymentNotFound { deployment_id: String },

    /// Source resource vanished before it could be replayed
    #[error("resource '{resource_name}' not found in deployment '{deployment_id}'")]
    ResourceNotFound {
        deployment_id: String,
        resource_name: String,
    },

    /// Replay completed without putting the definition into its tier
    #[error("deployment '{deployment_id}' didn't put {kind} '{definition_id}' in the cache")]
    CacheRepairFailed {
        kind: DefinitionKind,
        definition_id: String,
        deployment_id: String,
    },

    /// Model resource could not be fetched or parsed
    #[error("could not load {format} model for {kind} '{definition_id}': {source}")]
    ModelLoadFailed {
        format: ModelFormat,
        kind: DefinitionKind,
        definition_id: String,
        #[source]
        source: ModelLoadCause,
    },

    /// Eviction hook failed after the entry was evicted
    #[error("failed to evict {kind} '{definition_id}' from the deployment cache: {source}")]
    EvictionFailed {
        kind: DefinitionKind,
        definition_id: String,
        #[source]
        source: HookError,
    },

    /// Storage failure
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Deployer pipeline failure
    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),
}

impl CacheError {
    /// Translate a storage error raised while looking up `kind`
    #[must_use]
    pub fn from_store(kind: DefinitionKind, err: StoreError) -> Self {
        match err {
            StoreError::AmbiguousTenant { key } => Self::AmbiguousTenant { kind, key },
            StoreError::AccessDenied(message) => Self::AccessDenied(message),
            other => Self::Store(other),
        }
    }

    /// Check if error reports legitimate absence
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if error is a caller mistake rather than a fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::NotFound { .. }
                | Self::AmbiguousTenant { .. }
                | Self::AccessDenied(_)
        )
    }

    /// Check if error signals a data-integrity or internal consistency fault
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::CacheRepairFailed { .. }
                | Self::DeploymentNotFound { .. }
                | Self::ResourceNotFound { .. }
        )
    }

    /// Family the error is about, when known
    #[must_use]
    pub fn kind(&self) -> Option<DefinitionKind> {
        match self {
            Self::NotFound { kind, .. }
            | Self::AmbiguousTenant { kind, .. }
            | Self::CacheRepairFailed { kind, .. }
            | Self::ModelLoadFailed { kind, .. }
            | Self::EvictionFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccessDenied(message) => Self::AccessDenied(message),
            other => Self::Store(other),
        }
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = CacheError::NotFound {
            kind: DefinitionKind::Case,
            criteria: "id 'claim:1'".to_string(),
        };
        assert_eq!(err.to_string(), "no deployed case definition found with id 'claim:1'");
        assert!(err.is_not_found());
        assert!(err.is_client_error());
        assert!(!err.is_internal());
        assert_eq!(err.kind(), Some(DefinitionKind::Case));
    }

    #[test]
    fn repair_failure_is_internal() {
        let err = CacheError::CacheRepairFailed {
            kind: DefinitionKind::Process,
            definition_id: "p:1".to_string(),
            deployment_id: "dep-1".to_string(),
        };
        assert!(err.is_internal());
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "deployment 'dep-1' didn't put process definition 'p:1' in the cache"
        );
    }

    #[test]
    fn store_ambiguity_is_tagged_with_family() {
        let err = CacheError::from_store(
            DefinitionKind::Decision,
            StoreError::AmbiguousTenant { key: "dish".to_string() },
        );
        assert!(matches!(
            err,
            CacheError::AmbiguousTenant { kind: DefinitionKind::Decision, ref key } if key == "dish"
        ));
    }

    #[test]
    fn store_errors_convert() {
        let err: CacheError = StoreError::backend("connection reset").into();
        assert!(matches!(err, CacheError::Store(StoreError::Backend(_))));

        let err: CacheError = StoreError::AccessDenied("tenant t2".to_string()).into();
        assert!(matches!(err, CacheError::AccessDenied(_)));
    }

    #[test]
    fn model_load_display_names_format() {
        let err = CacheError::ModelLoadFailed {
            format: ModelFormat::Bpmn,
            kind: DefinitionKind::Process,
            definition_id: "p:1".to_string(),
            source: ParseError::malformed(ModelFormat::Bpmn, "eof").into(),
        };
        let text = err.to_string();
        assert!(text.contains("BPMN model"));
        assert!(text.contains("process definition 'p:1'"));
    }
}
