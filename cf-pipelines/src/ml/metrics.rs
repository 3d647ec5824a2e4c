//! Metrics, expectations and model evaluation results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A threshold a metric value must respect. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Satisfied when the value is at least the threshold.
    GreaterThan(f64),
    /// Satisfied when the value is at most the threshold.
    LowerThan(f64),
}

impl Expectation {
    /// Returns whether `value` meets the expectation.
    #[must_use]
    pub fn is_satisfied(&self, value: f64) -> bool {
        match *self {
            Self::GreaterThan(threshold) => value >= threshold,
            Self::LowerThan(threshold) => value <= threshold,
        }
    }

    /// Returns the threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        match *self {
            Self::GreaterThan(threshold) | Self::LowerThan(threshold) => threshold,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GreaterThan(threshold) => write!(f, "greater than {threshold}"),
            Self::LowerThan(threshold) => write!(f, "lower than {threshold}"),
        }
    }
}

/// A named measurement with an expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name.
    pub name: String,
    /// Measured value.
    pub value: f64,
    /// What the value should be.
    pub expectation: Expectation,
}

impl Metric {
    /// Creates a metric.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, expectation: Expectation) -> Self {
        Self {
            name: name.into(),
            value,
            expectation,
        }
    }

    /// Returns whether the value meets the expectation.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.expectation.is_satisfied(self.value)
    }

    /// Returns the metric as `{name: value}`.
    #[must_use]
    pub fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([(self.name.clone(), self.value)])
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Metric {} with value {} expected to be {}",
            self.name, self.value, self.expectation
        )
    }
}

/// A boolean check attached to an evaluation.
pub type Condition = Arc<dyn Fn() -> bool + Send + Sync>;

/// The outcome of evaluating a model.
///
/// Returned as a function output, it is checked by
/// [`MlPipeline`](super::MlPipeline) once the function completes. Conditions
/// are kept in memory only.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ModelEvaluationResult {
    /// Metrics, in insertion order.
    pub metrics: Vec<Metric>,
    #[serde(skip)]
    conditions: Vec<Condition>,
}

impl ModelEvaluationResult {
    /// Creates an empty evaluation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an evaluation from metrics.
    #[must_use]
    pub fn with_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            metrics,
            conditions: Vec::new(),
        }
    }

    /// Adds a metric.
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Arc::new(condition));
        self
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the metrics whose expectation is not met.
    #[must_use]
    pub fn failed_metrics(&self) -> Vec<Metric> {
        self.metrics
            .iter()
            .filter(|m| !m.is_satisfied())
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ModelEvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEvaluationResult")
            .field("metrics", &self.metrics)
            .field("conditions", &self.conditions.len())
            .finish()
    }
}
