//! Model parsers
//!
//! A [`ModelParser`] turns the bytes of one deployment resource into a
//! [`ModelInstance`]. The cache holds one parser per [`ModelFormat`] in a
//! [`ParserSet`].
//!
//! The built-in [`JsonModelParser`] reads an element tree encoded as JSON:
//!
//! ```json
//! {"type": "definitions", "children": [{"type": "process", "id": "order"}]}
//! ```
//!
//! XML front ends plug in through the same trait.

use crate::error::ParseError;
use bpe_model::{ModelElement, ModelFormat, ModelInstance};
use std::fmt;
use std::sync::Arc;

/// Parser for one document format
///
/// Parsing must be deterministic: the cache tolerates two threads parsing
/// the same resource concurrently and keeps whichever result lands last.
pub trait ModelParser: Send + Sync {
    /// Parse resource bytes into a model
    ///
    /// # Errors
    /// Returns `ParseError` if the bytes are not a valid model
    fn parse(&self, bytes: &[u8]) -> Result<ModelInstance, ParseError>;
}

/// Parser for JSON-encoded element trees
#[derive(Debug, Clone, Copy)]
pub struct JsonModelParser {
    format: ModelFormat,
}

impl JsonModelParser {
    /// Create parser for one model format
    #[inline]
    #[must_use]
    pub fn new(format: ModelFormat) -> Self {
        Self { format }
    }

    /// Format this parser accepts
    #[inline]
    #[must_use]
    pub fn format(&self) -> ModelFormat {
        self.format
    }
}

impl ModelParser for JsonModelParser {
    fn parse(&self, bytes: &[u8]) -> Result<ModelInstance, ParseError> {
        let root: ModelElement = serde_json::from_slice(bytes)
            .map_err(|e| ParseError::malformed(self.format, e.to_string()))?;

        if root.element_type != ModelInstance::ROOT_ELEMENT {
            return Err(ParseError::invalid_model(
                self.format,
                format!(
                    "expected root element '{}', found '{}'",
                    ModelInstance::ROOT_ELEMENT,
                    root.element_type
                ),
            ));
        }

        Ok(ModelInstance::new(self.format, root))
    }
}

/// One parser per document format
#[derive(Clone)]
pub struct ParserSet {
    parsers: [Arc<dyn ModelParser>; 3],
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::json()
    }
}

impl fmt::Debug for ParserSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserSet")
            .field("formats", &ModelFormat::ALL)
            .finish()
    }
}

impl ParserSet {
    /// JSON parser for every format
    #[must_use]
    pub fn json() -> Self {
        Self {
            parsers: ModelFormat::ALL.map(|format| {
                Arc::new(JsonModelParser::new(format)) as Arc<dyn ModelParser>
            }),
        }
    }

    /// With parser for one format
    #[must_use]
    pub fn with_parser(mut self, format: ModelFormat, parser: Arc<dyn ModelParser>) -> Self {
        self.parsers[format.index()] = parser;
        self
    }

    /// Parser registered for a format
    #[inline]
    #[must_use]
    pub fn get(&self, format: ModelFormat) -> &dyn ModelParser {
        self.parsers[format.index()].as_ref()
    }
}
