//! Machine learning pipelines.
//!
//! [`MlPipeline`] groups functions by [`MachineLearningStep`], reports the
//! mandatory steps a pipeline is missing, and gates runs on the metrics of
//! every [`ModelEvaluationResult`] a function returns.

pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod step;

pub use metrics::{Condition, Expectation, Metric, ModelEvaluationResult};
pub use pipeline::{CompletenessPolicy, MlPipeline, META_PREFIX};
pub use publisher::{
    CompositeMetricsPublisher, LocalMetricsPublisher, MetricsPublisher, TrackingMetricsPublisher,
};
pub use step::MachineLearningStep;
