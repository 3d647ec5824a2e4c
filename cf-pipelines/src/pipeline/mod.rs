//! Pipeline registration, dependency resolution and execution.
//!
//! This module provides:
//! - The function registry and lineage table
//! - Name-based dependency resolution and cycle detection
//! - Run identifiers and artifact paths
//! - Lifecycle hooks, codecs and the DAG executor
//! - The [`Pipeline`] tying them together

mod codec;
mod engine;
mod executor;
mod extra_args;
mod graph;
mod hooks;
mod paths;
mod registry;
mod resolver;


pub use codec::{BinaryCodec, Codec, CodecRegistry, JsonCodec, TextCodec};
pub use engine::{Pipeline, DEFAULT_LOCATION};
pub use executor::{
    ArtifactObserver, DagExecutor, ExecutionPlan, Executor, PlannedArtifact, PlannedFunction,
    RunReport,
};
pub use extra_args::{
    ExtraArgument, ExtraArguments, ExtraOrigin, VariableLookup, DEFAULT_ENV_PREFIX,
};
pub use graph::PipelineDag;
pub use hooks::{AfterHook, BeforeHook, ErrorHook, InvocationRecord, LifecycleHooks};
pub use paths::{ArtifactLocator, RunId, DEFAULT_RUN_SEGMENT, RUN_ID_FORMAT};
pub use registry::FunctionRegistry;
pub use resolver::{solve_dependencies, source_of, DependencyMap};
