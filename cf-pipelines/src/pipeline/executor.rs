//! Graph executors.
//!
//! An [`Executor`] walks an [`ExecutionPlan`]: it calls every function once
//! its dependencies have completed, persists the results and stops at the
//! first failure.

use super::codec::CodecRegistry;
use super::graph::PipelineDag;
use super::hooks::{InvocationRecord, LifecycleHooks};
use super::paths::RunId;
use crate::core::{Arguments, ArtifactValue, FunctionDetails, InvocationStatus, Outputs, ProductLineage};
use crate::errors::{ExecutionFault, PipelineError};
use crate::observability::function_span;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Notified after every artifact is written.
pub trait ArtifactObserver: Send + Sync {
    /// Called with the artifact name, its lineage and where it was written.
    fn artifact_written(&self, artifact: &str, lineage: &ProductLineage, path: &Path);
}

/// An output a planned function writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedArtifact {
    /// The artifact name.
    pub name: String,
    /// Its lineage.
    pub lineage: ProductLineage,
    /// Where it is written.
    pub path: PathBuf,
}

/// One function ready to be executed.
#[derive(Debug, Clone)]
pub struct PlannedFunction {
    /// The registry record.
    pub details: FunctionDetails,
    /// Outputs and their destinations.
    pub artifacts: Vec<PlannedArtifact>,
    /// Inputs supplied from outside the graph.
    pub external: Arguments,
}

/// Everything an executor needs for one run.
pub struct ExecutionPlan {
    /// The pipeline name.
    pub pipeline: String,
    /// The run being executed.
    pub run_id: RunId,
    /// The validated graph.
    pub dag: PipelineDag,
    /// Function name -> planned function.
    pub functions: HashMap<String, PlannedFunction>,
    /// Hooks around each invocation.
    pub hooks: LifecycleHooks,
    /// Codecs used to persist outputs.
    pub codecs: CodecRegistry,
    /// Optional artifact observer.
    pub observer: Option<Arc<dyn ArtifactObserver>>,
}

impl Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("pipeline", &self.pipeline)
            .field("run_id", &self.run_id)
            .field("order", &self.dag.topological_order())
            .field("hooks", &self.hooks)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// The pipeline name.
    pub pipeline: String,
    /// The run segment artifacts were written under.
    pub run_segment: String,
    /// One record per invocation, in completion order.
    pub invocations: Vec<InvocationRecord>,
    /// Artifact name -> written path.
    pub artifacts: BTreeMap<String, PathBuf>,
    /// Wall-clock duration of the run.
    pub duration_seconds: f64,
}

impl RunReport {
    /// Returns the record of a function, if it ran.
    #[must_use]
    pub fn invocation(&self, function: &str) -> Option<&InvocationRecord> {
        self.invocations.iter().find(|r| r.function == function)
    }
}

/// Runs an execution plan.
#[async_trait]
pub trait Executor: Send + Sync + Debug {
    /// Executes every function of the plan.
    async fn execute(&self, plan: Arc<ExecutionPlan>) -> Result<RunReport, PipelineError>;
}

/// In-process executor scheduling functions as their dependencies complete.
///
/// Functions run on the blocking thread pool. With the default concurrency of
/// one, functions (and therefore hooks) never overlap.
#[derive(Debug, Clone)]
pub struct DagExecutor {
    max_concurrency: usize,
}

impl Default for DagExecutor {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

/// Result of one node, as reported by its task.
struct NodeOutcome {
    record: InvocationRecord,
    result: Result<(Outputs, Vec<(String, PathBuf)>), ExecutionFault>,
}

impl DagExecutor {
    /// Creates an executor running at most `max_concurrency` functions at once.
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn spawn_node(
        plan: &Arc<ExecutionPlan>,
        name: String,
        completed: &Arc<RwLock<HashMap<String, ArtifactValue>>>,
    ) -> impl std::future::Future<Output = (String, Result<NodeOutcome, JoinError>)> {
        let plan = Arc::clone(plan);
        let completed = Arc::clone(completed);
        let task_name = name.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let Some(planned) = plan.functions.get(&task_name) else {
                let fault = ExecutionFault::Raised(anyhow::anyhow!("function '{task_name}' is not planned"));
                return NodeOutcome {
                    record: InvocationRecord {
                        function: task_name,
                        status: InvocationStatus::Failed,
                        elapsed_seconds: 0.0,
                    },
                    result: Err(fault),
                };
            };
            let span = function_span(&task_name, &planned.details.group);
            let _guard = span.enter();

            let args = gather_arguments(planned, &completed.read());
            let (mut record, result) = plan.hooks.dispatch(planned.details.function.as_ref(), &args);
            let result = result.and_then(|outputs| match persist(&plan, planned, &outputs) {
                Ok(written) => Ok((owned_outputs(planned, outputs), written)),
                Err(fault) => {
                    plan.hooks.report_error(&task_name, &fault, record.elapsed_seconds);
                    Err(fault)
                }
            });
            if result.is_err() {
                record.status = InvocationStatus::Failed;
            }
            NodeOutcome { record, result }
        });

        async move { (name, handle.await) }
    }
}

fn gather_arguments(planned: &PlannedFunction, completed: &HashMap<String, ArtifactValue>) -> Arguments {
    let mut args = planned.external.clone();
    for need in &planned.details.needs {
        if args.contains_key(need) {
            continue;
        }
        if let Some(value) = completed.get(need) {
            args.insert(need.clone(), value.clone());
        }
    }
    args
}

/// Keeps the outputs whose lineage points at this function. Artifacts
/// shadowed by a later registration never reach dependents.
fn owned_outputs(planned: &PlannedFunction, outputs: Outputs) -> Outputs {
    outputs
        .into_iter()
        .filter(|(name, _)| planned.artifacts.iter().any(|artifact| &artifact.name == name))
        .collect()
}

fn persist(
    plan: &ExecutionPlan,
    planned: &PlannedFunction,
    outputs: &Outputs,
) -> Result<Vec<(String, PathBuf)>, ExecutionFault> {
    let mut written = Vec::with_capacity(planned.artifacts.len());
    for artifact in &planned.artifacts {
        let Some(value) = outputs.get(&artifact.name) else {
            continue;
        };
        plan.codecs.write(value, &artifact.path)?;
        debug!(artifact = %artifact.name, path = %artifact.path.display(), "Artifact written");
        if let Some(observer) = &plan.observer {
            observer.artifact_written(&artifact.name, &artifact.lineage, &artifact.path);
        }
        written.push((artifact.name.clone(), artifact.path.clone()));
    }
    Ok(written)
}

fn join_fault(err: &JoinError) -> ExecutionFault {
    if err.is_panic() {
        ExecutionFault::Panicked(err.to_string())
    } else {
        ExecutionFault::Panicked(format!("task aborted: {err}"))
    }
}

#[async_trait]
impl Executor for DagExecutor {
    async fn execute(&self, plan: Arc<ExecutionPlan>) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let dag = &plan.dag;
        info!(
            pipeline = %plan.pipeline,
            run_id = %plan.run_id,
            functions = dag.len(),
            max_concurrency = self.max_concurrency,
            "Executing pipeline"
        );

        let completed: Arc<RwLock<HashMap<String, ArtifactValue>>> = Arc::new(RwLock::new(HashMap::new()));

        // Number of unfinished dependencies per node.
        let mut in_degree: HashMap<&str, usize> = dag
            .nodes()
            .iter()
            .map(|name| (name.as_str(), dag.dependencies_of(name).count()))
            .collect();

        let mut ready: VecDeque<String> = dag
            .nodes()
            .iter()
            .filter(|name| in_degree[name.as_str()] == 0)
            .cloned()
            .collect();

        let mut active = FuturesUnordered::new();
        let mut invocations = Vec::with_capacity(dag.len());
        let mut artifacts = BTreeMap::new();
        let mut failure: Option<PipelineError> = None;

        loop {
            while failure.is_none() && active.len() < self.max_concurrency {
                let Some(name) = ready.pop_front() else { break };
                debug!(function = %name, "Scheduling function");
                active.push(Self::spawn_node(&plan, name, &completed));
            }

            let Some((name, joined)) = active.next().await else {
                break;
            };

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => NodeOutcome {
                    record: InvocationRecord {
                        function: name.clone(),
                        status: InvocationStatus::Failed,
                        elapsed_seconds: 0.0,
                    },
                    result: Err(join_fault(&err)),
                },
            };
            invocations.push(outcome.record);

            match outcome.result {
                Ok((outputs, written)) => {
                    completed.write().extend(outputs);
                    artifacts.extend(written);
                    for child in dag.dependents_of(&name) {
                        if let Some(count) = in_degree.get_mut(child) {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                ready.push_back(child.to_string());
                            }
                        }
                    }
                }
                Err(fault) => {
                    if failure.is_none() {
                        warn!(function = %name, error = %fault, "Stopping pipeline after failure");
                        failure = Some(PipelineError::build(name, fault));
                    } else {
                        warn!(function = %name, error = %fault, "Additional failure while draining");
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if invocations.len() < dag.len() {
            let pending: Vec<&String> = dag
                .nodes()
                .iter()
                .filter(|name| !invocations.iter().any(|r| &r.function == *name))
                .collect();
            return Err(PipelineError::Internal(format!(
                "Deadlocked graph; remaining functions: {pending:?}"
            )));
        }

        let duration_seconds = start.elapsed().as_secs_f64();
        info!(pipeline = %plan.pipeline, duration_seconds, "Pipeline completed");

        Ok(RunReport {
            pipeline: plan.pipeline.clone(),
            run_segment: plan.run_id.segment().to_string(),
            invocations,
            artifacts,
            duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outputs;
    use crate::functions::{require, FnFunction, FunctionDeclaration, PipelineFunction};
    use crate::pipeline::DependencyMap;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn planned(
        dir: &Path,
        name: &str,
        needs: &[&str],
        produces: &[&str],
        func: impl Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync + 'static,
    ) -> PlannedFunction {
        let function: Arc<dyn PipelineFunction> = Arc::new(FnFunction::new(
            name,
            FunctionDeclaration::new()
                .needs(needs.iter().copied())
                .produces(produces.iter().copied()),
            func,
        ));
        let artifacts = produces
            .iter()
            .map(|key| {
                let artifact = crate::core::remove_extension(key).to_string();
                let lineage = ProductLineage::new("group", *key, name);
                PlannedArtifact {
                    name: artifact,
                    path: dir.join("default").join("group").join(key),
                    lineage,
                }
            })
            .collect();
        PlannedFunction {
            details: FunctionDetails::new(
                function,
                produces.iter().map(|k| crate::core::remove_extension(k).to_string()),
                needs.iter().copied(),
                "group",
            ),
            artifacts,
            external: Arguments::new(),
        }
    }

    fn plan(functions: Vec<PlannedFunction>, dependencies: DependencyMap, hooks: LifecycleHooks) -> Arc<ExecutionPlan> {
        let nodes: Vec<String> = functions
            .iter()
            .map(|f| f.details.function.name().to_string())
            .collect();
        Arc::new(ExecutionPlan {
            pipeline: "test".to_string(),
            run_id: RunId::Default,
            dag: PipelineDag::build(&nodes, dependencies).unwrap(),
            functions: functions
                .into_iter()
                .map(|f| (f.details.function.name().to_string(), f))
                .collect(),
            hooks,
            codecs: CodecRegistry::default(),
            observer: None,
        })
    }

    fn chain(dir: &Path) -> Vec<PlannedFunction> {
        vec![
            planned(dir, "one", &[], &["a.txt"], |_| Ok(outputs([("a.txt", "1")]))),
            planned(dir, "two", &["a"], &["b.txt"], |args| {
                let a = require(args, "a")?.as_str().unwrap_or_default().to_string();
                Ok(outputs([("b.txt", format!("{a}2"))]))
            }),
        ]
    }

    fn chain_dependencies() -> DependencyMap {
        [("two".to_string(), BTreeSet::from(["one".to_string()]))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_executes_in_dependency_order() {
        let dir = TempDir::new().unwrap();
        let plan = plan(chain(dir.path()), chain_dependencies(), LifecycleHooks::new());

        let report = DagExecutor::default().execute(plan).await.unwrap();

        let order: Vec<_> = report.invocations.iter().map(|r| r.function.as_str()).collect();
        assert_eq!(order, vec!["one", "two"]);
        assert_eq!(report.run_segment, "default");
        let b = std::fs::read_to_string(&report.artifacts["b"]).unwrap();
        assert_eq!(b, "12");
    }

    #[tokio::test]
    async fn test_fails_fast() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);
        let mut hooks = LifecycleHooks::new();
        hooks.set_before(Arc::new(move |name| c.lock().push(name.to_string())));

        let functions = vec![
            planned(dir.path(), "one", &[], &["a.txt"], |_| anyhow::bail!("boom")),
            planned(dir.path(), "two", &["a"], &["b.txt"], |_| Ok(outputs([("b.txt", "x")]))),
        ];
        let plan = plan(functions, chain_dependencies(), hooks);

        let err = DagExecutor::default().execute(plan).await.unwrap_err();

        match err {
            PipelineError::Build { function, fault } => {
                assert_eq!(function, "one");
                assert!(matches!(fault, ExecutionFault::Raised(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*calls.lock(), vec!["one".to_string()]);
        assert!(!dir.path().join("default/group/b.txt").exists());
    }

    #[tokio::test]
    async fn test_panic_becomes_fault() {
        let dir = TempDir::new().unwrap();
        let functions = vec![planned(dir.path(), "bad", &[], &["a.txt"], |_| panic!("oops"))];
        let plan = plan(functions, DependencyMap::new(), LifecycleHooks::new());

        let err = DagExecutor::default().execute(plan).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Build {
                fault: ExecutionFault::Panicked(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_external_arguments_are_passed() {
        let dir = TempDir::new().unwrap();
        let mut function = planned(dir.path(), "greet", &["hello"], &["out.txt"], |args| {
            Ok(outputs([("out.txt", require(args, "hello")?.clone())]))
        });
        function.external.insert("hello".to_string(), "hola".into());
        let plan = plan(vec![function], DependencyMap::new(), LifecycleHooks::new());

        let report = DagExecutor::new(4).execute(plan).await.unwrap();
        assert_eq!(std::fs::read_to_string(&report.artifacts["out"]).unwrap(), "hola");
    }

    #[tokio::test]
    async fn test_parallel_independent_nodes() {
        let dir = TempDir::new().unwrap();
        let functions = (0..4)
            .map(|i| {
                let key = format!("out_{i}.txt");
                let k = key.clone();
                planned(dir.path(), &format!("f{i}"), &[], &[key.as_str()], move |_| {
                    Ok(outputs([(k.clone(), "done")]))
                })
            })
            .collect();
        let plan = plan(functions, DependencyMap::new(), LifecycleHooks::new());

        let report = DagExecutor::new(4).execute(plan).await.unwrap();
        assert_eq!(report.invocations.len(), 4);
        assert!(report
            .invocations
            .iter()
            .all(|r| r.status == InvocationStatus::Completed));
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        assert_eq!(DagExecutor::new(0).max_concurrency(), 1);
        assert_eq!(DagExecutor::default().max_concurrency(), 1);
    }
}
