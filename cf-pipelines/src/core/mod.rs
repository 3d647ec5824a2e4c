//! Core domain model types for cf-pipelines.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Artifact values and the argument/output maps built from them
//! - Function details and product lineage records
//! - Invocation status

mod artifact;
mod details;
mod status;

pub use artifact::{outputs, remove_extension, Arguments, ArtifactValue, Outputs};
pub use details::{ArtifactSource, FunctionDetails, ProductLineage};
pub use status::InvocationStatus;
