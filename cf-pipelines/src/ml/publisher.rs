//! Metrics publishers.

use super::metrics::Metric;
use crate::errors::TrackingError;
use crate::tracking::TrackingSession;
use parking_lot::RwLock;
use std::sync::Arc;

/// Receives every metric of every evaluation.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsPublisher: Send + Sync {
    /// Publishes one metric.
    fn publish(&self, metric: &Metric) -> Result<(), TrackingError>;
}

/// Keeps published metrics in memory.
#[derive(Debug, Default)]
pub struct LocalMetricsPublisher {
    published: RwLock<Vec<Metric>>,
}

impl LocalMetricsPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every published metric, in publishing order.
    #[must_use]
    pub fn published_metrics(&self) -> Vec<Metric> {
        self.published.read().clone()
    }

    /// Returns the number of published metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.read().len()
    }

    /// Returns whether nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.published.read().is_empty()
    }
}

impl MetricsPublisher for LocalMetricsPublisher {
    fn publish(&self, metric: &Metric) -> Result<(), TrackingError> {
        self.published.write().push(metric.clone());
        Ok(())
    }
}

/// Forwards every metric to several publishers, once each.
#[derive(Default)]
pub struct CompositeMetricsPublisher {
    publishers: Vec<Arc<dyn MetricsPublisher>>,
}

impl CompositeMetricsPublisher {
    /// Creates a composite over `publishers`.
    #[must_use]
    pub fn new(publishers: Vec<Arc<dyn MetricsPublisher>>) -> Self {
        Self { publishers }
    }

    /// Adds a publisher.
    #[must_use]
    pub fn with(mut self, publisher: Arc<dyn MetricsPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }
}

impl MetricsPublisher for CompositeMetricsPublisher {
    fn publish(&self, metric: &Metric) -> Result<(), TrackingError> {
        for publisher in &self.publishers {
            publisher.publish(metric)?;
        }
        Ok(())
    }
}

/// Logs metrics as `name -> value` to a tracking session.
#[derive(Debug, Clone)]
pub struct TrackingMetricsPublisher {
    session: Arc<dyn TrackingSession>,
}

impl TrackingMetricsPublisher {
    /// Creates a publisher writing to `session`.
    #[must_use]
    pub fn new(session: Arc<dyn TrackingSession>) -> Self {
        Self { session }
    }
}

impl MetricsPublisher for TrackingMetricsPublisher {
    fn publish(&self, metric: &Metric) -> Result<(), TrackingError> {
        self.session.log_metric(&metric.name, metric.value)
    }
}
