//! A pipeline organised around the machine learning steps.

use super::metrics::ModelEvaluationResult;
use super::publisher::{MetricsPublisher, TrackingMetricsPublisher};
use super::step::MachineLearningStep;
use crate::config::MlPipelineConfig;
use crate::core::{Arguments, FunctionDetails, Outputs, ProductLineage};
use crate::errors::{ExecutionFault, MetricValidationError, PipelineError};
use crate::functions::{FnFunction, FunctionDeclaration, FunctionHandle, PipelineFunction};
use crate::pipeline::{
    AfterHook, ArtifactObserver, DependencyMap, ExtraArguments, Pipeline, PipelineDag, RunReport,
};
use crate::tracking::{ExperimentTracker, NoOpTracker, SessionStatus, TrackingSession};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Prefix of parameters logged by the pipeline itself.
pub const META_PREFIX: &str = "meta";

/// What a run does when mandatory steps have no function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessPolicy {
    /// Run anyway.
    #[default]
    Ignore,
    /// Run, logging the missing steps.
    Warn,
    /// Refuse to run.
    Fail,
}

/// A [`Pipeline`] whose groups are [`MachineLearningStep`]s.
///
/// Runs are tracked in an experiment tracking session, and every
/// [`ModelEvaluationResult`] a function returns is checked: its metrics are
/// published, then the run fails if any expectation is not met.
pub struct MlPipeline {
    inner: Pipeline,
    registered_steps: BTreeMap<MachineLearningStep, usize>,
    step_of: HashMap<String, MachineLearningStep>,
    completeness: CompletenessPolicy,
    tracker: Arc<dyn ExperimentTracker>,
    publisher: Option<Arc<dyn MetricsPublisher>>,
    log_metrics_to_tracker: bool,
}

impl std::fmt::Debug for MlPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlPipeline")
            .field("inner", &self.inner)
            .field("registered_steps", &self.registered_steps)
            .field("completeness", &self.completeness)
            .field("tracker", &self.tracker)
            .field("publisher", &self.publisher.is_some())
            .field("log_metrics_to_tracker", &self.log_metrics_to_tracker)
            .finish()
    }
}

macro_rules! step_shorthand {
    ($(#[$doc:meta] $method:ident => $step:ident),* $(,)?) => {
        $(
            #[$doc]
            pub fn $method<F>(
                &mut self,
                name: &str,
                declaration: FunctionDeclaration,
                func: F,
            ) -> Result<FunctionHandle, PipelineError>
            where
                F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync + 'static,
            {
                self.step(MachineLearningStep::$step, name, declaration, func)
            }
        )*
    };
}

impl MlPipeline {
    /// Creates a pipeline with default settings and no tracking backend.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_pipeline(Pipeline::new(name))
    }

    /// Wraps an existing pipeline.
    ///
    /// Functions it already holds count towards their step when their group
    /// is a step label.
    #[must_use]
    pub fn from_pipeline(inner: Pipeline) -> Self {
        let mut registered_steps = BTreeMap::new();
        let mut step_of = HashMap::new();
        for (name, details) in inner.registry().iter() {
            if let Ok(step) = details.group.parse::<MachineLearningStep>() {
                step_of.insert(name.to_string(), step);
                *registered_steps.entry(step).or_default() += 1;
            }
        }
        Self {
            inner,
            registered_steps,
            step_of,
            completeness: CompletenessPolicy::default(),
            tracker: Arc::new(NoOpTracker),
            publisher: None,
            log_metrics_to_tracker: false,
        }
    }

    /// Creates a pipeline from a configuration.
    pub fn from_config(config: &MlPipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self::from_pipeline(Pipeline::from_config(&config.pipeline)?)
            .with_completeness(config.completeness)
            .with_log_metrics_to_tracker(config.log_metrics_to_tracker))
    }

    /// Sets the experiment tracker.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets the metrics publisher.
    #[must_use]
    pub fn with_metrics_publisher(mut self, publisher: Arc<dyn MetricsPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Sets the completeness policy.
    #[must_use]
    pub fn with_completeness(mut self, policy: CompletenessPolicy) -> Self {
        self.completeness = policy;
        self
    }

    /// Also logs every metric to the tracking session.
    #[must_use]
    pub fn with_log_metrics_to_tracker(mut self, enabled: bool) -> Self {
        self.log_metrics_to_tracker = enabled;
        self
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner
    }

    /// Returns the extra arguments of the underlying pipeline.
    pub fn extra_arguments_mut(&mut self) -> &mut ExtraArguments {
        self.inner.extra_arguments_mut()
    }

    /// Sets the hook called before each function.
    pub fn set_before_function<F>(&mut self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.set_before_function(hook);
    }

    /// Sets the hook called after each function, once its metrics passed.
    pub fn set_after_function<F>(&mut self, hook: F)
    where
        F: Fn(&str, &Outputs, f64) -> Result<(), ExecutionFault> + Send + Sync + 'static,
    {
        self.inner.set_after_function(hook);
    }

    /// Sets the hook called when a function fails.
    pub fn set_exception_handler<F>(&mut self, hook: F)
    where
        F: Fn(&str, &ExecutionFault, f64) + Send + Sync + 'static,
    {
        self.inner.set_exception_handler(hook);
    }

    /// Registers a closure under a step.
    pub fn step<F>(
        &mut self,
        step: MachineLearningStep,
        name: &str,
        declaration: FunctionDeclaration,
        func: F,
    ) -> Result<FunctionHandle, PipelineError>
    where
        F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync + 'static,
    {
        self.step_function(step, Arc::new(FnFunction::new(name, declaration, func)))
    }

    /// Registers a function under a step.
    pub fn step_function(
        &mut self,
        step: MachineLearningStep,
        function: Arc<dyn PipelineFunction>,
    ) -> Result<FunctionHandle, PipelineError> {
        let name = function.name().to_string();
        let handle = self.inner.register_function(step.as_str(), function)?;

        if let Some(previous) = self.step_of.insert(name, step) {
            self.decrement(previous);
        }
        *self.registered_steps.entry(step).or_default() += 1;
        Ok(handle)
    }

    step_shorthand! {
        /// Registers a closure under [`MachineLearningStep::DataIngestion`].
        data_ingestion => DataIngestion,
        /// Registers a closure under [`MachineLearningStep::DataValidation`].
        data_validation => DataValidation,
        /// Registers a closure under [`MachineLearningStep::FeatureEngineering`].
        feature_engineering => FeatureEngineering,
        /// Registers a closure under [`MachineLearningStep::ModelTraining`].
        model_training => ModelTraining,
        /// Registers a closure under [`MachineLearningStep::ModelTesting`].
        model_testing => ModelTesting,
        /// Registers a closure under [`MachineLearningStep::ModelDeployment`].
        model_deployment => ModelDeployment,
    }

    fn decrement(&mut self, step: MachineLearningStep) {
        if let Some(count) = self.registered_steps.get_mut(&step) {
            *count = count.saturating_sub(1);
        }
    }

    /// Removes a function, decrementing its step.
    pub fn remove(&mut self, name: &str) -> Option<FunctionDetails> {
        let details = self.inner.remove(name)?;
        if let Some(step) = self.step_of.remove(name) {
            self.decrement(step);
        }
        Some(details)
    }

    /// Returns how many functions each step has.
    #[must_use]
    pub fn registered_steps(&self) -> &BTreeMap<MachineLearningStep, usize> {
        &self.registered_steps
    }

    /// Returns the mandatory steps without any function.
    #[must_use]
    pub fn missing_required_groups(&self) -> BTreeSet<MachineLearningStep> {
        MachineLearningStep::mandatory()
            .filter(|step| self.registered_steps.get(step).copied().unwrap_or_default() == 0)
            .collect()
    }

    /// Computes the prerequisites of every function.
    pub fn solve_dependencies(&self) -> Result<DependencyMap, PipelineError> {
        self.inner.solve_dependencies()
    }

    /// Resolves dependencies and builds the graph.
    pub fn make_dag(&self) -> Result<PipelineDag, PipelineError> {
        self.inner.make_dag()
    }

    /// Returns where an artifact is written in the current run.
    pub fn artifact_path(&self, artifact: &str) -> Result<PathBuf, PipelineError> {
        self.inner.artifact_path(artifact)
    }

    fn check_completeness(&self) -> Result<(), PipelineError> {
        let missing = self.missing_required_groups();
        if missing.is_empty() {
            return Ok(());
        }
        let labels: Vec<String> = missing.iter().map(ToString::to_string).collect();
        match self.completeness {
            CompletenessPolicy::Ignore => {
                debug!(pipeline = %self.inner.name(), missing = ?labels, "Pipeline has missing steps");
                Ok(())
            }
            CompletenessPolicy::Warn => {
                warn!(pipeline = %self.inner.name(), missing = ?labels, "Pipeline has missing steps");
                Ok(())
            }
            CompletenessPolicy::Fail => Err(PipelineError::IncompletePipeline { missing: labels }),
        }
    }

    /// Runs every function inside a new tracking session.
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        self.check_completeness()?;

        let run_name = self.inner.generate_run_id().segment().to_string();
        let session = self.tracker.start_session(self.inner.name(), &run_name)?;

        let hooks = self.inner.hooks().with_leading_after(evaluation_hook(
            Arc::clone(&session),
            self.publisher.clone(),
            self.log_metrics_to_tracker,
        ));
        let observer: Arc<dyn ArtifactObserver> = Arc::new(SessionArtifacts {
            session: Arc::clone(&session),
        });

        let result = match self.inner.plan(hooks, Some(observer)) {
            Ok(plan) => self.inner.execute(plan).await,
            Err(err) => Err(err),
        };

        let status = if result.is_ok() {
            SessionStatus::Finished
        } else {
            SessionStatus::Failed
        };
        match session.end(status) {
            Ok(()) => result,
            Err(tracking) if result.is_ok() => Err(tracking.into()),
            Err(tracking) => {
                warn!(error = %tracking, "Could not end tracking session");
                result
            }
        }
    }
}

/// Builds the hook timing every function and gating every evaluation.
fn evaluation_hook(
    session: Arc<dyn TrackingSession>,
    publisher: Option<Arc<dyn MetricsPublisher>>,
    log_metrics_to_tracker: bool,
) -> AfterHook {
    let session_publisher = log_metrics_to_tracker.then(|| TrackingMetricsPublisher::new(Arc::clone(&session)));

    Arc::new(move |name: &str, results: &Outputs, elapsed: f64| {
        session
            .log_param(&format!("{META_PREFIX}.{name}.time"), &serde_json::json!(elapsed))
            .map_err(|e| ExecutionFault::Hook(e.into()))?;

        let mut keys: Vec<&String> = results.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(evaluation) = results[key].as_evaluation() {
                let mut publishers: Vec<&dyn MetricsPublisher> = Vec::with_capacity(2);
                if let Some(publisher) = &publisher {
                    publishers.push(publisher.as_ref());
                }
                if let Some(publisher) = &session_publisher {
                    publishers.push(publisher);
                }
                gate(evaluation, &publishers)?;
            }
        }
        Ok(())
    })
}

/// Publishes every metric, then fails if any is unsatisfied.
fn gate(evaluation: &ModelEvaluationResult, publishers: &[&dyn MetricsPublisher]) -> Result<(), ExecutionFault> {
    for metric in &evaluation.metrics {
        for publisher in publishers {
            publisher
                .publish(metric)
                .map_err(|e| ExecutionFault::Hook(e.into()))?;
        }
    }

    let failed = evaluation.failed_metrics();
    if failed.is_empty() {
        return Ok(());
    }
    let err = MetricValidationError::new(failed);
    error!(failed = err.failed.len(), "{err}");
    Err(err.into())
}

/// Uploads every written artifact to the session, under its group.
struct SessionArtifacts {
    session: Arc<dyn TrackingSession>,
}

impl ArtifactObserver for SessionArtifacts {
    fn artifact_written(&self, artifact: &str, lineage: &ProductLineage, path: &Path) {
        if let Err(err) = self.session.log_artifact(path, Some(&lineage.group)) {
            warn!(artifact, error = %err, "Could not upload artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outputs;
    use crate::functions::require;
    use crate::ml::publisher::MockMetricsPublisher;
    use crate::ml::{Expectation, LocalMetricsPublisher, Metric};
    use crate::tracking::InMemoryTracker;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn produces(key: &str) -> FunctionDeclaration {
        FunctionDeclaration::new().produces([key])
    }

    fn thing(_: &Arguments) -> anyhow::Result<Outputs> {
        Ok(outputs([("thing", 0)]))
    }

    #[test]
    fn test_doesnt_have_any_steps() {
        let pipeline = MlPipeline::new("A machine learning pipeline");
        assert_eq!(pipeline.missing_required_groups().len(), 5);
    }

    #[test]
    fn test_doesnt_have_all_steps() {
        let mut pipeline = MlPipeline::new("A machine learning pipeline");
        pipeline.data_ingestion("ingest_data", produces("thing"), thing).unwrap();
        pipeline.data_validation("validate_data", produces("thing2"), thing).unwrap();

        let missing = pipeline.missing_required_groups();
        assert!(!missing.contains(&MachineLearningStep::DataIngestion));
        assert!(missing.contains(&MachineLearningStep::ModelTraining));
    }

    #[test]
    fn test_has_all_steps() {
        let mut pipeline = MlPipeline::new("A machine learning pipeline");
        pipeline.data_ingestion("ingest_data", produces("thing"), thing).unwrap();
        pipeline.data_validation("validate_data", produces("a"), thing).unwrap();
        pipeline.feature_engineering("feature_engineering", produces("b"), thing).unwrap();
        pipeline.model_training("model_training", produces("c"), thing).unwrap();
        pipeline.model_testing("model_testing", produces("d"), thing).unwrap();

        assert!(pipeline.missing_required_groups().is_empty());
    }

    #[test]
    fn test_remove_function() {
        let mut pipeline = MlPipeline::new("A machine learning pipeline");
        pipeline.data_ingestion("ingest_data", produces("thing"), thing).unwrap();
        pipeline.model_training("train", produces("model"), thing).unwrap();
        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::DataIngestion], 1);

        assert!(pipeline.remove("ingest_data").is_some());

        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::DataIngestion], 0);
        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::ModelTraining], 1);
        assert!(pipeline.remove("ingest_data").is_none());
    }

    #[test]
    fn test_reregistration_moves_count() {
        let mut pipeline = MlPipeline::new("p");
        pipeline.data_ingestion("f", produces("thing"), thing).unwrap();
        pipeline.data_validation("f", produces("thing"), thing).unwrap();

        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::DataIngestion], 0);
        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::DataValidation], 1);
        assert_eq!(pipeline.pipeline().function("f").unwrap().group, "data_validation");
    }

    #[test]
    fn test_wrapped_pipeline_counts_existing_steps() {
        let mut inner = Pipeline::new("p");
        inner.register("data_ingestion", "load", produces("raw"), thing).unwrap();
        inner.register("reporting", "report", produces("report"), thing).unwrap();

        let mut pipeline = MlPipeline::from_pipeline(inner);

        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::DataIngestion], 1);
        assert_eq!(pipeline.registered_steps().len(), 1);
        pipeline.remove("load").unwrap();
        assert_eq!(pipeline.registered_steps()[&MachineLearningStep::DataIngestion], 0);
    }

    fn evaluation_pipeline(location: &Path, value: f64) -> MlPipeline {
        let mut pipeline =
            MlPipeline::from_pipeline(Pipeline::new("A machine learning pipeline").with_location(location));
        pipeline
            .data_ingestion("data_ingestion", produces("data"), move |_| Ok(outputs([("data", value)])))
            .unwrap();
        pipeline
            .data_validation(
                "validate_model",
                FunctionDeclaration::new().needs(["data"]).produces(["metrics.json"]),
                |args| {
                    let data = require(args, "data")?.as_f64().unwrap_or_default();
                    let evaluation = ModelEvaluationResult::new()
                        .metric(Metric::new("f1", data, Expectation::GreaterThan(0.6)))
                        .metric(Metric::new("accuracy", data, Expectation::GreaterThan(0.6)));
                    Ok(outputs([("metrics.json", evaluation)]))
                },
            )
            .unwrap();
        pipeline
    }

    #[tokio::test]
    async fn test_validate_function_passes() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(LocalMetricsPublisher::new());
        let tracker = Arc::new(InMemoryTracker::new());
        let mut pipeline = evaluation_pipeline(dir.path(), 0.9)
            .with_metrics_publisher(publisher.clone())
            .with_tracker(tracker.clone());

        pipeline.run().await.unwrap();

        assert_eq!(
            publisher.published_metrics(),
            vec![
                Metric::new("f1", 0.9, Expectation::GreaterThan(0.6)),
                Metric::new("accuracy", 0.9, Expectation::GreaterThan(0.6)),
            ]
        );
        let run = tracker.last_run().unwrap();
        assert_eq!(run.experiment, "A machine learning pipeline");
        assert_eq!(run.run_name, "default");
        assert_eq!(run.status, Some(SessionStatus::Finished));
        assert!(run.params.contains_key("meta.data_ingestion.time"));
        assert!(run.params.contains_key("meta.validate_model.time"));
        assert!(run.metrics.is_empty());
        assert!(run
            .artifacts
            .iter()
            .any(|(path, group)| path.ends_with("metrics.json") && group.as_deref() == Some("data_validation")));

        let written = std::fs::read_to_string(dir.path().join("default/data_validation/metrics.json")).unwrap();
        assert!(written.contains("\"f1\""));
    }

    #[tokio::test]
    async fn test_validate_metrics_fails_after_publishing() {
        let dir = TempDir::new().unwrap();
        let publisher = Arc::new(LocalMetricsPublisher::new());
        let tracker = Arc::new(InMemoryTracker::new());
        let mut pipeline = evaluation_pipeline(dir.path(), 0.5)
            .with_metrics_publisher(publisher.clone())
            .with_tracker(tracker.clone());

        let err = pipeline.run().await.unwrap_err();

        let validation = err.as_validation().unwrap();
        assert_eq!(validation.metric_names(), vec!["f1", "accuracy"]);
        assert_eq!(publisher.len(), 2);
        assert_eq!(tracker.last_run().unwrap().status, Some(SessionStatus::Failed));
    }

    #[tokio::test]
    async fn test_publisher_called_once_per_metric() {
        let dir = TempDir::new().unwrap();
        let mut publisher = MockMetricsPublisher::new();
        publisher.expect_publish().times(2).returning(|_| Ok(()));
        let mut pipeline = evaluation_pipeline(dir.path(), 0.9).with_metrics_publisher(Arc::new(publisher));

        pipeline.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_logged_to_tracker() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        let mut pipeline = evaluation_pipeline(dir.path(), 0.9)
            .with_tracker(tracker.clone())
            .with_log_metrics_to_tracker(true);

        pipeline.run().await.unwrap();

        let run = tracker.last_run().unwrap();
        assert_eq!(run.metric("f1"), Some(0.9));
        assert_eq!(run.metric("accuracy"), Some(0.9));
    }

    #[tokio::test]
    async fn test_user_after_hook_runs_after_gating() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut pipeline = evaluation_pipeline(dir.path(), 0.5);
        let s = Arc::clone(&seen);
        pipeline.set_after_function(move |name, _, _| {
            s.lock().push(name.to_string());
            Ok(())
        });

        assert!(pipeline.run().await.is_err());
        assert_eq!(*seen.lock(), vec!["data_ingestion".to_string()]);
    }

    #[tokio::test]
    async fn test_completeness_policy() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = evaluation_pipeline(dir.path(), 0.9).with_completeness(CompletenessPolicy::Fail);

        match pipeline.run().await {
            Err(PipelineError::IncompletePipeline { missing }) => {
                assert_eq!(missing, vec!["feature_engineering", "model_training", "model_testing"]);
            }
            other => panic!("expected an incomplete pipeline, got {other:?}"),
        }

        let mut pipeline = evaluation_pipeline(dir.path(), 0.9).with_completeness(CompletenessPolicy::Warn);
        assert!(pipeline.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_tracked_run_name_is_run_segment() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        let mut pipeline = MlPipeline::from_pipeline(
            Pipeline::new("tracked").with_location(dir.path()).with_track_all(true),
        )
        .with_tracker(tracker.clone());
        pipeline.data_ingestion("load", produces("raw.txt"), |_| Ok(outputs([("raw.txt", "rows")]))).unwrap();

        let report = pipeline.run().await.unwrap();

        assert_eq!(tracker.last_run().unwrap().run_name, report.run_segment);
        assert_ne!(report.run_segment, "default");
    }
}
