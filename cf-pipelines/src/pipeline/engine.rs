//! The pipeline: registration, validation and runs.

use super::codec::CodecRegistry;
use super::executor::{
    ArtifactObserver, DagExecutor, ExecutionPlan, Executor, PlannedArtifact, PlannedFunction, RunReport,
};
use super::extra_args::ExtraArguments;
use super::graph::PipelineDag;
use super::hooks::LifecycleHooks;
use super::paths::{ArtifactLocator, RunId};
use super::registry::FunctionRegistry;
use super::resolver::{self, DependencyMap};
use crate::config::PipelineConfig;
use crate::core::{Arguments, ArtifactSource, ArtifactValue, FunctionDetails, Outputs};
use crate::errors::{ExecutionFault, PipelineError};
use crate::functions::{extract, FnFunction, FunctionDeclaration, FunctionHandle, PipelineFunction};
use crate::observability::pipeline_span;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Default root directory of pipeline runs.
pub const DEFAULT_LOCATION: &str = ".pipelines";

/// A set of functions wired together by the artifacts they need and produce.
///
/// ```rust,no_run
/// use cf_pipelines::prelude::*;
///
/// # async fn demo() -> Result<(), PipelineError> {
/// let mut pipeline = Pipeline::new("greetings");
/// pipeline.register("step_1", "hello", FunctionDeclaration::new().produces(["greeting.txt"]), |_| {
///     Ok(outputs([("greeting.txt", "Hello")]))
/// })?;
/// pipeline.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    location: PathBuf,
    track_all: bool,
    registry: FunctionRegistry,
    extra: ExtraArguments,
    run_id: RunId,
    hooks: LifecycleHooks,
    codecs: CodecRegistry,
    executor: Arc<dyn Executor>,
}

impl Pipeline {
    /// Creates a pipeline with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: PathBuf::from(DEFAULT_LOCATION),
            track_all: false,
            registry: FunctionRegistry::new(),
            extra: ExtraArguments::default(),
            run_id: RunId::Default,
            hooks: LifecycleHooks::new(),
            codecs: CodecRegistry::default(),
            executor: Arc::new(DagExecutor::default()),
        }
    }

    /// Creates a pipeline from a configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let values: HashMap<String, ArtifactValue> = config
            .extra_args
            .iter()
            .map(|(k, v)| (k.clone(), ArtifactValue::from(v.clone())))
            .collect();

        Ok(Self::new(config.name.clone())
            .with_location(config.location.clone())
            .with_track_all(config.track_all)
            .with_extra_arguments(ExtraArguments::new(values).with_prefix(config.env_prefix.clone()))
            .with_executor(Arc::new(DagExecutor::new(config.max_concurrency))))
    }

    /// Sets the root location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = location.into();
        self
    }

    /// Enables or disables per-run directories.
    #[must_use]
    pub fn with_track_all(mut self, track_all: bool) -> Self {
        self.track_all = track_all;
        self
    }

    /// Sets the extra-argument source.
    #[must_use]
    pub fn with_extra_arguments(mut self, extra: ExtraArguments) -> Self {
        self.extra = extra;
        self
    }

    /// Sets the executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Sets the codecs used to persist artifacts.
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the root location.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns whether every run gets its own directory.
    #[must_use]
    pub fn track_all(&self) -> bool {
        self.track_all
    }

    /// Returns the function registry.
    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Returns the details of a registered function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionDetails> {
        self.registry.get(name)
    }

    /// Returns the extra-argument source.
    #[must_use]
    pub fn extra_arguments(&self) -> &ExtraArguments {
        &self.extra
    }

    /// Returns a mutable reference to the extra-argument source.
    pub fn extra_arguments_mut(&mut self) -> &mut ExtraArguments {
        &mut self.extra
    }

    /// Returns the current hooks.
    #[must_use]
    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// Registers a closure as a function of `group`.
    pub fn register<F>(
        &mut self,
        group: &str,
        name: &str,
        declaration: FunctionDeclaration,
        func: F,
    ) -> Result<FunctionHandle, PipelineError>
    where
        F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync + 'static,
    {
        self.register_function(group, Arc::new(FnFunction::new(name, declaration, func)))
    }

    /// Registers a function of `group`.
    ///
    /// Registering a name again replaces the previous function.
    pub fn register_function(
        &mut self,
        group: &str,
        function: Arc<dyn PipelineFunction>,
    ) -> Result<FunctionHandle, PipelineError> {
        let metadata = extract(function.as_ref())?;
        let name = function.name().to_string();
        self.registry.register(
            name,
            Arc::clone(&function),
            group,
            metadata.inputs,
            &metadata.outputs,
        );
        Ok(FunctionHandle::new(function))
    }

    /// Removes a function and the artifacts it produces.
    pub fn remove(&mut self, name: &str) -> Option<FunctionDetails> {
        self.registry.remove(name)
    }

    /// Computes the prerequisites of every function.
    pub fn solve_dependencies(&self) -> Result<DependencyMap, PipelineError> {
        Ok(resolver::solve_dependencies(&self.registry, &self.extra)?)
    }

    /// Finds where an artifact comes from.
    #[must_use]
    pub fn source_of(&self, artifact: &str) -> Option<ArtifactSource> {
        resolver::source_of(&self.registry, &self.extra, artifact)
    }

    /// Resolves dependencies and builds the graph.
    pub fn make_dag(&self) -> Result<PipelineDag, PipelineError> {
        let dependencies = self.solve_dependencies()?;
        let dag = PipelineDag::build(self.registry.names(), dependencies)?;
        debug!(pipeline = %self.name, order = ?dag.topological_order(), "Graph built");
        Ok(dag)
    }

    /// Checks that the pipeline can run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.make_dag().map(|_| ())
    }

    /// Regenerates the run id: a fresh timestamp when every run is tracked,
    /// `default` otherwise.
    pub fn generate_run_id(&mut self) -> &RunId {
        self.run_id = if self.track_all {
            RunId::generate()
        } else {
            RunId::Default
        };
        &self.run_id
    }

    /// Returns the current run id.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the artifact locator of the current run.
    #[must_use]
    pub fn locator(&self) -> ArtifactLocator {
        ArtifactLocator::new(self.location.clone(), self.run_id.clone())
    }

    /// Returns where an artifact is written in the current run.
    pub fn artifact_path(&self, artifact: &str) -> Result<PathBuf, PipelineError> {
        self.registry
            .lineage(artifact)
            .map(|lineage| self.locator().path_for(lineage))
            .ok_or_else(|| PipelineError::UnknownArtifact(artifact.to_string()))
    }

    /// Sets the hook called before each function.
    pub fn set_before_function<F>(&mut self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.set_before(Arc::new(hook));
    }

    /// Sets the hook called after each function returns normally.
    pub fn set_after_function<F>(&mut self, hook: F)
    where
        F: Fn(&str, &Outputs, f64) -> Result<(), ExecutionFault> + Send + Sync + 'static,
    {
        self.hooks.set_after(Arc::new(hook));
    }

    /// Sets the hook called when a function fails.
    pub fn set_exception_handler<F>(&mut self, hook: F)
    where
        F: Fn(&str, &ExecutionFault, f64) + Send + Sync + 'static,
    {
        self.hooks.set_on_error(Arc::new(hook));
    }

    /// Runs every function.
    ///
    /// A new run id is generated first, so tracked pipelines write each run
    /// to a new directory.
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        self.generate_run_id();
        let plan = self.plan(self.hooks.clone(), None)?;
        self.execute(plan).await
    }

    /// Builds the execution plan of the current run.
    pub(crate) fn plan(
        &self,
        hooks: LifecycleHooks,
        observer: Option<Arc<dyn ArtifactObserver>>,
    ) -> Result<Arc<ExecutionPlan>, PipelineError> {
        let dag = self.make_dag()?;
        let locator = self.locator();

        let mut functions = HashMap::with_capacity(self.registry.len());
        for (name, details) in self.registry.iter() {
            let mut external = Arguments::new();
            for need in &details.needs {
                if let Some(ArtifactSource::External(argument)) = self.source_of(need) {
                    external.insert(need.clone(), argument.value);
                }
            }

            let artifacts = details
                .produces
                .iter()
                .filter_map(|artifact| {
                    let lineage = self.registry.lineage(artifact)?;
                    (lineage.produced_by == name).then(|| PlannedArtifact {
                        name: artifact.clone(),
                        lineage: lineage.clone(),
                        path: locator.path_for(lineage),
                    })
                })
                .collect();

            functions.insert(
                name.to_string(),
                PlannedFunction {
                    details: details.clone(),
                    artifacts,
                    external,
                },
            );
        }

        Ok(Arc::new(ExecutionPlan {
            pipeline: self.name.clone(),
            run_id: self.run_id.clone(),
            dag,
            functions,
            hooks,
            codecs: self.codecs.clone(),
            observer,
        }))
    }

    /// Hands a plan to the executor.
    pub(crate) async fn execute(&self, plan: Arc<ExecutionPlan>) -> Result<RunReport, PipelineError> {
        let span = pipeline_span(&self.name, plan.run_id.segment());
        info!(parent: &span, pipeline = %self.name, run_id = %plan.run_id, "Running pipeline");
        self.executor.execute(plan).instrument(span).await
    }
}
