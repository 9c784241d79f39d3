//! Deployment cache configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! capacity = 1000
//! eviction = "lru"
//!
//! [tiers]
//! process = 5000
//! dmn = 200
//! ```

use crate::error::ConfigError;
use bpe_model::{DefinitionKind, ModelFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of entries per tier
pub const DEFAULT_CAPACITY: u64 = 1000;

/// Eviction policy applied once a tier is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eviction {
    /// Evict the least recently used entry
    #[default]
    Lru,
    /// Frequency-aware admission with LRU eviction
    TinyLfu,
}

/// Per-tier capacity overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierCapacities {
    /// Capacity of the process definition tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<u64>,
    /// Capacity of the case definition tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<u64>,
    /// Capacity of the decision definition tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<u64>,
    /// Capacity of the decision requirements definition tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_requirements: Option<u64>,
    /// Capacity of the BPMN model tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpmn: Option<u64>,
    /// Capacity of the CMMN model tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmmn: Option<u64>,
    /// Capacity of the DMN model tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmn: Option<u64>,
}

/// Deployment cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Entries per tier unless overridden
    pub capacity: u64,
    /// Eviction policy for every tier
    pub eviction: Eviction,
    /// Per-tier overrides
    pub tiers: TierCapacities,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            eviction: Eviction::default(),
            tiers: TierCapacities::default(),
        }
    }
}

impl CacheConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default capacity for every tier
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// With eviction policy
    #[inline]
    #[must_use]
    pub fn with_eviction(mut self, eviction: Eviction) -> Self {
        self.eviction = eviction;
        self
    }

    /// With capacity override for one definition tier
    #[must_use]
    pub fn with_definition_capacity(mut self, kind: DefinitionKind, capacity: u64) -> Self {
        let slot = match kind {
            DefinitionKind::Process => &mut self.tiers.process,
            DefinitionKind::Case => &mut self.tiers.case,
            DefinitionKind::Decision => &mut self.tiers.decision,
            DefinitionKind::DecisionRequirements => &mut self.tiers.decision_requirements,
        };
        *slot = Some(capacity);
        self
    }

    /// With capacity override for one model tier
    #[must_use]
    pub fn with_model_capacity(mut self, format: ModelFormat, capacity: u64) -> Self {
        let slot = match format {
            ModelFormat::Bpmn => &mut self.tiers.bpmn,
            ModelFormat::Cmmn => &mut self.tiers.cmmn,
            ModelFormat::Dmn => &mut self.tiers.dmn,
        };
        *slot = Some(capacity);
        self
    }

    /// Effective capacity of a definition tier
    #[must_use]
    pub fn definition_capacity(&self, kind: DefinitionKind) -> u64 {
        let slot = match kind {
            DefinitionKind::Process => self.tiers.process,
            DefinitionKind::Case => self.tiers.case,
            DefinitionKind::Decision => self.tiers.decision,
            DefinitionKind::DecisionRequirements => self.tiers.decision_requirements,
        };
        slot.unwrap_or(self.capacity)
    }

    /// Effective capacity of a model tier
    #[must_use]
    pub fn model_capacity(&self, format: ModelFormat) -> u64 {
        let slot = match format {
            ModelFormat::Bpmn => self.tiers.bpmn,
            ModelFormat::Cmmn => self.tiers.cmmn,
            ModelFormat::Dmn => self.tiers.dmn,
        };
        slot.unwrap_or(self.capacity)
    }

    /// Check every effective capacity is non-zero
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first empty tier
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in DefinitionKind::ALL {
            if self.definition_capacity(kind) == 0 {
                return Err(ConfigError::Invalid(format!(
                    "capacity of the {} tier must be greater than zero",
                    kind.label()
                )));
            }
        }
        for format in ModelFormat::ALL {
            if self.model_capacity(format) == 0 {
                return Err(ConfigError::Invalid(format!(
                    "capacity of the {format} model tier must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    /// Returns error on bad syntax, unknown keys or empty tiers
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = CacheConfig::from_toml_str("").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.definition_capacity(DefinitionKind::Case), DEFAULT_CAPACITY);
    }

    #[test]
    fn tier_overrides() {
        let config = CacheConfig::from_toml_str(
            r#"
capacity = 50
eviction = "tiny_lfu"

[tiers]
process = 500
dmn = 5
"#,
        )
        .unwrap();

        assert_eq!(config.eviction, Eviction::TinyLfu);
        assert_eq!(config.definition_capacity(DefinitionKind::Process), 500);
        assert_eq!(config.definition_capacity(DefinitionKind::Decision), 50);
        assert_eq!(config.model_capacity(ModelFormat::Dmn), 5);
        assert_eq!(config.model_capacity(ModelFormat::Bpmn), 50);
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = CacheConfig::from_toml_str("[tiers]\ncmmn = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("CMMN")));

        let err = CacheConfig::new().with_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("process tier"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = CacheConfig::from_toml_str("capacty = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)));
    }

    #[test]
    fn builder_round_trips_through_toml() {
        let config = CacheConfig::new()
            .with_capacity(64)
            .with_definition_capacity(DefinitionKind::DecisionRequirements, 8)
            .with_model_capacity(ModelFormat::Cmmn, 16);

        let rendered = config.to_toml_string().unwrap();
        let parsed = CacheConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "capacity = 3").unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.capacity, 3);

        let missing = CacheConfig::from_file("/nonexistent/bpe-cache.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
