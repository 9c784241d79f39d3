//! Artifact families and structural document formats

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four families of published definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    /// Process definition (BPMN)
    Process,
    /// Case definition (CMMN)
    Case,
    /// Decision definition (DMN decision)
    Decision,
    /// Decision requirements definition (DMN requirements graph)
    DecisionRequirements,
}

impl DefinitionKind {
    /// Every family, in tier order
    pub const ALL: [DefinitionKind; 4] = [
        DefinitionKind::Process,
        DefinitionKind::Case,
        DefinitionKind::Decision,
        DefinitionKind::DecisionRequirements,
    ];

    /// Stable slot of this family in per-family arrays
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            DefinitionKind::Process => 0,
            DefinitionKind::Case => 1,
            DefinitionKind::Decision => 2,
            DefinitionKind::DecisionRequirements => 3,
        }
    }

    /// Short lowercase label used in messages ("process", "decision requirements")
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            DefinitionKind::Process => "process",
            DefinitionKind::Case => "case",
            DefinitionKind::Decision => "decision",
            DefinitionKind::DecisionRequirements => "decision requirements",
        }
    }

    /// Document format paired with this family, if it has a model tier
    ///
    /// Decision requirements definitions share their DMN resource with the
    /// decisions they contain but do not own a model entry of their own.
    #[inline]
    #[must_use]
    pub const fn model_format(self) -> Option<ModelFormat> {
        match self {
            DefinitionKind::Process => Some(ModelFormat::Bpmn),
            DefinitionKind::Case => Some(ModelFormat::Cmmn),
            DefinitionKind::Decision => Some(ModelFormat::Dmn),
            DefinitionKind::DecisionRequirements => None,
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} definition", self.label())
    }
}

/// The three structural document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// Business process model
    Bpmn,
    /// Case management model
    Cmmn,
    /// Decision model
    Dmn,
}

impl ModelFormat {
    /// Every format, in tier order
    pub const ALL: [ModelFormat; 3] = [ModelFormat::Bpmn, ModelFormat::Cmmn, ModelFormat::Dmn];

    /// Stable slot of this format in per-format arrays
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            ModelFormat::Bpmn => 0,
            ModelFormat::Cmmn => 1,
            ModelFormat::Dmn => 2,
        }
    }

    /// Upper-case format name ("BPMN")
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ModelFormat::Bpmn => "BPMN",
            ModelFormat::Cmmn => "CMMN",
            ModelFormat::Dmn => "DMN",
        }
    }

    /// Definition family owning model entries of this format
    #[inline]
    #[must_use]
    pub const fn definition_kind(self) -> DefinitionKind {
        match self {
            ModelFormat::Bpmn => DefinitionKind::Process,
            ModelFormat::Cmmn => DefinitionKind::Case,
            ModelFormat::Dmn => DefinitionKind::Decision,
        }
    }

    /// Resource name suffixes recognised for this format
    #[must_use]
    pub const fn resource_suffixes(self) -> &'static [&'static str] {
        match self {
            ModelFormat::Bpmn => &["bpmn20.xml", "bpmn"],
            ModelFormat::Cmmn => &["cmmn11.xml", "cmmn10.xml", "cmmn"],
            ModelFormat::Dmn => &["dmn11.xml", "dmn"],
        }
    }

    /// Check if a resource name carries one of this format's suffixes
    #[must_use]
    pub fn matches_resource(self, resource_name: &str) -> bool {
        self.resource_suffixes().iter().any(|suffix| {
            resource_name
                .strip_suffix(suffix)
                .is_some_and(|stem| stem.ends_with('.'))
        })
    }

    /// Format of a resource, determined by its name
    #[must_use]
    pub fn for_resource(resource_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.matches_resource(resource_name))
    }

    /// Definition families that a resource of this format can produce
    #[must_use]
    pub const fn produced_kinds(self) -> &'static [DefinitionKind] {
        match self {
            ModelFormat::Bpmn => &[DefinitionKind::Process],
            ModelFormat::Cmmn => &[DefinitionKind::Case],
            ModelFormat::Dmn => &[DefinitionKind::Decision, DefinitionKind::DecisionRequirements],
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
