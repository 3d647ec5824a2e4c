//! Lifecycle hooks around every function invocation.

use crate::core::{remove_extension, Arguments, InvocationStatus, Outputs};
use crate::errors::ExecutionFault;
use crate::functions::PipelineFunction;
use crate::observability::SpanTimer;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Called with the function name before it runs.
pub type BeforeHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the function name, its results and the elapsed seconds after
/// it returns normally. An error aborts the run.
pub type AfterHook = Arc<dyn Fn(&str, &Outputs, f64) -> Result<(), ExecutionFault> + Send + Sync>;

/// Called with the function name, the fault and the elapsed seconds when the
/// function fails.
pub type ErrorHook = Arc<dyn Fn(&str, &ExecutionFault, f64) + Send + Sync>;

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// The function name.
    pub function: String,
    /// Final status.
    pub status: InvocationStatus,
    /// Seconds spent inside the function.
    pub elapsed_seconds: f64,
}

/// The before, after and on-error hook slots.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    before: Option<BeforeHook>,
    after: Option<AfterHook>,
    on_error: Option<ErrorHook>,
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl LifecycleHooks {
    /// Creates an empty set of hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the before hook.
    pub fn set_before(&mut self, hook: BeforeHook) {
        self.before = Some(hook);
    }

    /// Sets the after hook.
    pub fn set_after(&mut self, hook: AfterHook) {
        self.after = Some(hook);
    }

    /// Sets the on-error hook.
    pub fn set_on_error(&mut self, hook: ErrorHook) {
        self.on_error = Some(hook);
    }

    /// Returns a copy whose after hook runs `first`, then the current one.
    #[must_use]
    pub fn with_leading_after(&self, first: AfterHook) -> Self {
        let mut hooks = self.clone();
        hooks.after = Some(match self.after.clone() {
            Some(existing) => Arc::new(move |name: &str, results: &Outputs, elapsed: f64| {
                first(name, results, elapsed)?;
                existing(name, results, elapsed)
            }),
            None => first,
        });
        hooks
    }

    /// Logs a fault and passes it to the on-error hook.
    pub fn report_error(&self, name: &str, fault: &ExecutionFault, elapsed: f64) {
        error!(function = name, elapsed_seconds = elapsed, error = %fault, "Function failed");
        if let Some(on_error) = &self.on_error {
            on_error(name, fault, elapsed);
        }
    }

    /// Runs a function through its lifecycle.
    ///
    /// On success the results are re-keyed by artifact name before the after
    /// hook sees them.
    pub fn dispatch(
        &self,
        function: &dyn PipelineFunction,
        args: &Arguments,
    ) -> (InvocationRecord, Result<Outputs, ExecutionFault>) {
        let name = function.name();
        let mut status = InvocationStatus::Pending;
        advance(name, &mut status, InvocationStatus::Running);

        if let Some(before) = &self.before {
            before(name);
        }

        let timer = SpanTimer::start(name);
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| function.call(args)))
            .map_err(|payload| ExecutionFault::Panicked(panic_message(payload.as_ref())))
            .and_then(|called| called.map_err(ExecutionFault::Raised))
            .and_then(|results| normalize(function, results));
        let elapsed = timer.finish_seconds();

        let outcome = match result {
            Ok(results) => match &self.after {
                Some(after) => after(name, &results, elapsed).map(|()| results),
                None => Ok(results),
            },
            Err(fault) => {
                self.report_error(name, &fault, elapsed);
                Err(fault)
            }
        };

        let next = if outcome.is_ok() {
            InvocationStatus::Completed
        } else {
            InvocationStatus::Failed
        };
        advance(name, &mut status, next);
        if outcome.is_ok() {
            info!(function = name, elapsed_seconds = elapsed, "Function completed");
        }

        (
            InvocationRecord {
                function: name.to_string(),
                status,
                elapsed_seconds: elapsed,
            },
            outcome,
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn advance(name: &str, status: &mut InvocationStatus, next: InvocationStatus) {
    debug_assert!(status.can_transition_to(next));
    debug!(function = name, from = %status, to = %next, "Invocation status changed");
    *status = next;
}

/// Checks the returned keys against the declaration and re-keys the results
/// by artifact name.
fn normalize(function: &dyn PipelineFunction, results: Outputs) -> Result<Outputs, ExecutionFault> {
    let declared: BTreeSet<&str> = function
        .declaration()
        .produced()
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .collect();
    let returned: BTreeSet<&str> = results.keys().map(String::as_str).collect();

    if declared != returned {
        return Err(ExecutionFault::OutputMismatch {
            declared: declared.iter().map(|k| (*k).to_string()).collect(),
            returned: returned.iter().map(|k| (*k).to_string()).collect(),
        });
    }

    Ok(results
        .into_iter()
        .map(|(key, value)| (remove_extension(&key).to_string(), value))
        .collect())
}
