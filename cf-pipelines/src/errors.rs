//! Error types for cf-pipelines.
//!
//! Every failure surfaced by registration, resolution, graph building or a
//! run is a variant of [`PipelineError`]. Faults raised while a single
//! function executes are described by [`ExecutionFault`] and wrapped in
//! [`PipelineError::Build`] together with the name of the failing function.

use crate::ml::Metric;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A function's outputs or inputs could not be determined.
    #[error("{0}")]
    Declaration(#[from] DeclarationError),

    /// A function input is neither produced nor supplied externally.
    #[error("{0}")]
    UnresolvedInput(#[from] UnresolvedInputError),

    /// The dependency graph contains at least one cycle.
    #[error("{0}")]
    Cycle(#[from] CycledPipelineError),

    /// No lineage entry exists for the requested artifact.
    #[error("Unknown artifact: '{0}' is not produced by any registered function")]
    UnknownArtifact(String),

    /// No function is registered under the requested name.
    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),

    /// A function failed while the pipeline was running.
    #[error("Failed to build pipeline: function '{function}' failed: {fault}")]
    Build {
        /// The function that failed.
        function: String,
        /// What went wrong.
        #[source]
        fault: ExecutionFault,
    },

    /// Mandatory machine learning steps are missing and the policy forbids running.
    #[error("Pipeline is missing mandatory steps: {}", missing.join(", "))]
    IncompletePipeline {
        /// The missing step labels.
        missing: Vec<String>,
    },

    /// The experiment tracking backend failed.
    #[error("{0}")]
    Tracking(#[from] TrackingError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a build error for the given function.
    #[must_use]
    pub fn build(function: impl Into<String>, fault: ExecutionFault) -> Self {
        Self::Build {
            function: function.into(),
            fault,
        }
    }

    /// Returns a stable code identifying the error category.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Declaration(_) => "CF-001-DECLARATION",
            Self::UnresolvedInput(_) => "CF-002-UNRESOLVED",
            Self::Cycle(_) => "CF-003-CYCLE",
            Self::UnknownArtifact(_) => "CF-004-UNKNOWN_ARTIFACT",
            Self::UnknownFunction(_) => "CF-005-UNKNOWN_FUNCTION",
            Self::Build { fault, .. } => fault.code(),
            Self::IncompletePipeline { .. } => "CF-007-INCOMPLETE",
            Self::Tracking(_) => "CF-008-TRACKING",
            Self::Config(_) => "CF-009-CONFIG",
            Self::Internal(_) => "CF-010-INTERNAL",
            Self::Io(_) => "CF-011-IO",
        }
    }

    /// Returns the metric validation failure if this error was caused by one.
    #[must_use]
    pub fn as_validation(&self) -> Option<&MetricValidationError> {
        match self {
            Self::Build {
                fault: ExecutionFault::Validation(err),
                ..
            } => Some(err),
            _ => None,
        }
    }
}

/// Error raised when a function declaration is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// The function never declared what it produces.
    #[error("Function {function} does not declare its outputs")]
    MissingOutputs {
        /// The function name.
        function: String,
    },

    /// The function declared an empty set of outputs.
    #[error("Function {function} does not return any value")]
    EmptyOutputs {
        /// The function name.
        function: String,
    },

    /// An output key cannot be used as a file name.
    #[error("Function {function} declares an invalid output key '{key}'")]
    InvalidOutputKey {
        /// The function name.
        function: String,
        /// The offending key.
        key: String,
    },

    /// An input name is not a valid identifier.
    #[error("Function {function} declares an invalid input name '{name}'")]
    InvalidInputName {
        /// The function name.
        function: String,
        /// The offending input name.
        name: String,
    },

    /// Two output keys map to the same artifact name.
    #[error("Function {function} declares artifact '{artifact}' more than once")]
    DuplicateArtifact {
        /// The function name.
        function: String,
        /// The artifact name shared by several keys.
        artifact: String,
    },
}

/// Error raised when a function needs an artifact nobody provides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Function '{function}' needs '{artifact}', which is not produced by any function nor supplied as an extra argument")]
pub struct UnresolvedInputError {
    /// The requesting function.
    pub function: String,
    /// The unresolved artifact name.
    pub artifact: String,
}

impl UnresolvedInputError {
    /// Creates a new unresolved input error.
    #[must_use]
    pub fn new(function: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            artifact: artifact.into(),
        }
    }
}

/// Error raised when the dependency graph is not acyclic.
///
/// `cycles` holds every `(dependent, dependency)` edge taking part in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Your pipeline contains cycles: {}", render_cycles(cycles))]
pub struct CycledPipelineError {
    /// Edges participating in a cycle, as `(dependent, dependency)`.
    pub cycles: Vec<(String, String)>,
}

impl CycledPipelineError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycles: Vec<(String, String)>) -> Self {
        Self { cycles }
    }

    /// Returns whether the given edge is reported.
    #[must_use]
    pub fn contains(&self, dependent: &str, dependency: &str) -> bool {
        self.cycles
            .iter()
            .any(|(a, b)| a == dependent && b == dependency)
    }
}

fn render_cycles(cycles: &[(String, String)]) -> String {
    cycles
        .iter()
        .map(|(dependent, dependency)| format!("\"{dependent}\" depends on \"{dependency}\"."))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A fault raised while a single function was running.
#[derive(Debug, Error)]
pub enum ExecutionFault {
    /// The function itself returned an error.
    #[error("{0}")]
    Raised(#[source] anyhow::Error),

    /// The function returned keys that differ from its declaration.
    #[error("returned outputs {returned:?} but declared {declared:?}")]
    OutputMismatch {
        /// Declared output keys.
        declared: Vec<String>,
        /// Keys actually returned.
        returned: Vec<String>,
    },

    /// One or more metric expectations were not met.
    #[error("{0}")]
    Validation(#[from] MetricValidationError),

    /// An output could not be persisted.
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// An after hook failed.
    #[error("after hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    /// The function panicked or its task was aborted.
    #[error("function panicked: {0}")]
    Panicked(String),
}

impl ExecutionFault {
    /// Returns a stable code identifying the fault category.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "CF-006-VALIDATION",
            Self::Codec(_) => "CF-006-CODEC",
            _ => "CF-006-EXECUTION",
        }
    }
}

/// Error raised when metric gating fails.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", failed.iter().map(|m| format!("Unsatisfied metric {m}")).collect::<Vec<_>>().join("\n"))]
pub struct MetricValidationError {
    /// Every metric whose expectation was not met.
    pub failed: Vec<Metric>,
}

impl MetricValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(failed: Vec<Metric>) -> Self {
        Self { failed }
    }

    /// Returns the names of the failed metrics.
    #[must_use]
    pub fn metric_names(&self) -> Vec<&str> {
        self.failed.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Error raised by a codec while reading or writing an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Codec error for {}: {reason}", path.display())]
pub struct CodecError {
    /// The artifact path.
    pub path: PathBuf,
    /// What went wrong.
    pub reason: String,
}

impl CodecError {
    /// Creates a new codec error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised by an experiment tracking backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tracking error: {0}")]
pub struct TrackingError(pub String);
