//! # cf-pipelines
//!
//! Code-first pipelines built from plain named functions.
//!
//! Each function declares the arguments it needs and the outputs it
//! produces. The pipeline works out which function produces what, infers
//! the dependency graph from those names, rejects cycles and unresolved
//! inputs, then runs every function in dependency order while writing each
//! output to disk:
//!
//! - **Dependency inference**: no explicit edges, inputs are matched to outputs by name
//! - **Lineage**: every artifact knows its producing function and group
//! - **Run tracking**: optional per-run directories keyed by timestamp
//! - **Lifecycle hooks**: before, after and on-error callbacks around every function
//! - **Machine learning**: step grouping, metric gating and experiment tracking
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cf_pipelines::prelude::*;
//!
//! let mut pipeline = Pipeline::new("greetings");
//! pipeline.register("step_1", "hello", FunctionDeclaration::new().produces(["hello.txt"]), |_| {
//!     Ok(outputs([("hello.txt", "Hello")]))
//! })?;
//! pipeline.register(
//!     "step_2",
//!     "shout",
//!     FunctionDeclaration::new().needs(["hello"]).produces(["loud.txt"]),
//!     |args| Ok(outputs([("loud.txt", require(args, "hello")?.to_json().to_string().to_uppercase())])),
//! )?;
//!
//! let report = pipeline.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod functions;
pub mod ml;
pub mod observability;
pub mod pipeline;
pub mod tracking;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{MlPipelineConfig, PipelineConfig};
    pub use crate::core::{
        outputs, Arguments, ArtifactValue, FunctionDetails, InvocationStatus, Outputs,
        ProductLineage,
    };
    pub use crate::errors::{
        CycledPipelineError, DeclarationError, ExecutionFault, MetricValidationError,
        PipelineError, UnresolvedInputError,
    };
    pub use crate::functions::{require, FunctionDeclaration, FunctionHandle, PipelineFunction};
    pub use crate::ml::{
        CompletenessPolicy, Expectation, MachineLearningStep, Metric, MetricsPublisher,
        MlPipeline, ModelEvaluationResult,
    };
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{
        DagExecutor, ExtraArguments, Pipeline, PipelineDag, RunId, RunReport,
    };
    pub use crate::tracking::{ExperimentTracker, SessionStatus, TrackingSession};
}
