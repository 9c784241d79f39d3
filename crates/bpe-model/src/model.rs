//! Parsed structural models
//!
//! A [`ModelInstance`] is the in-memory element tree of one BPMN, CMMN or
//! DMN resource. The tree is format-agnostic: every element carries its
//! type name, optional id and name, string attributes and children.

use crate::kind::ModelFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of a parsed model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelElement {
    /// Element type name ("process", "userTask", "decision", ...)
    #[serde(rename = "type")]
    pub element_type: String,

    /// Element id, unique within the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Remaining attributes by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Nested elements in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ModelElement>,
}

impl ModelElement {
    /// Create element of the given type
    #[must_use]
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            id: None,
            name: None,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// With element id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// With display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// With nested element appended
    #[must_use]
    pub fn with_child(mut self, child: ModelElement) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first pre-order walk over this element and its descendants
    pub fn walk(&self) -> impl Iterator<Item = &ModelElement> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }
}

/// Parsed model of one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInstance {
    format: ModelFormat,
    root: ModelElement,
}

impl ModelInstance {
    /// Root element name every supported format uses
    pub const ROOT_ELEMENT: &'static str = "definitions";

    /// Wrap a parsed root element
    #[must_use]
    pub fn new(format: ModelFormat, root: ModelElement) -> Self {
        Self { format, root }
    }

    /// Format the model was parsed from
    #[inline]
    #[must_use]
    pub fn format(&self) -> ModelFormat {
        self.format
    }

    /// Root `definitions` element
    #[inline]
    #[must_use]
    pub fn root(&self) -> &ModelElement {
        &self.root
    }

    /// Find element by id anywhere in the tree
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<&ModelElement> {
        self.root.walk().find(|e| e.id.as_deref() == Some(id))
    }

    /// All elements of the given type, in document order
    #[must_use]
    pub fn elements_of_type(&self, element_type: &str) -> Vec<&ModelElement> {
        self.root
            .walk()
            .filter(|e| e.element_type == element_type)
            .collect()
    }

    /// Total number of elements including the root
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.root.walk().count()
    }
}
