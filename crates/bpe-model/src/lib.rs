//! BPE Model
//!
//! Plain data types shared by the deployment cache and its collaborators.
//!
//! # Core Concepts
//!
//! - [`Deployment`]: a publication unit bundling named [`Resource`]s
//! - [`Definition`]: a published, versioned artifact of one [`DefinitionKind`]
//! - [`ModelInstance`]: the parsed structural form of a definition's source resource,
//!   in one of the [`ModelFormat`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use bpe_model::{Definition, DefinitionKind, Deployment, Resource};
//!
//! let mut deployment = Deployment::new("dep-1");
//! deployment.add_resource(Resource::new("dep-1", "invoice.bpmn", bytes));
//!
//! let definition = Definition::new(
//!     DefinitionKind::Process,
//!     "invoice:1:dep-1",
//!     "invoice",
//!     1,
//!     "dep-1",
//!     "invoice.bpmn",
//! );
//! assert_eq!(definition.kind().model_format(), Some(ModelFormat::Bpmn));
//! ```

#![warn(unreachable_pub)]

mod definition;
mod deployment;
mod kind;
mod model;

pub use definition::{Definition, DefinitionState};
pub use deployment::{Deployment, Resource};
pub use kind::{DefinitionKind, ModelFormat};
pub use model::{ModelElement, ModelInstance};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn definition_resource_matches_its_format() {
        let definition = Definition::new(
            DefinitionKind::Case,
            "claim:3:dep-9",
            "claim",
            3,
            "dep-9",
            "claims/claim.cmmn11.xml",
        );

        let format = definition.kind().model_format().unwrap();
        assert_eq!(format, ModelFormat::Cmmn);
        assert!(format.matches_resource(definition.resource_name()));
    }

    #[test]
    fn replayed_deployment_carries_single_resource() {
        let mut deployment = Deployment::new("dep-1");
        deployment.add_resource(Resource::new("dep-1", "a.bpmn", b"{}".to_vec()));
        deployment.add_resource(Resource::new("dep-1", "b.dmn", b"{}".to_vec()));

        deployment.mark_replayed();
        deployment.clear_resources();
        deployment.add_resource(Resource::new("dep-1", "b.dmn", b"{}".to_vec()));

        assert!(!deployment.is_new());
        assert_eq!(deployment.resource_names().collect::<Vec<_>>(), vec!["b.dmn"]);
    }
}
