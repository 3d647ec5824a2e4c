//! Experiment tracking backends.
//!
//! A run of a machine learning pipeline opens one [`TrackingSession`] on an
//! [`ExperimentTracker`], logs parameters, metrics and artifacts to it and
//! ends it with a [`SessionStatus`].

mod memory;

use crate::errors::TrackingError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, Level};

pub use memory::{InMemorySession, InMemoryTracker, TrackedRun};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Every function completed.
    Finished,
    /// The run stopped on an error.
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "FINISHED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One tracked run.
pub trait TrackingSession: Send + Sync + Debug {
    /// Returns the session identifier.
    fn id(&self) -> &str;

    /// Logs a parameter.
    fn log_param(&self, key: &str, value: &serde_json::Value) -> Result<(), TrackingError>;

    /// Logs a metric value.
    fn log_metric(&self, key: &str, value: f64) -> Result<(), TrackingError>;

    /// Uploads a file, optionally under a sub-directory of the run.
    fn log_artifact(&self, path: &Path, artifact_path: Option<&str>) -> Result<(), TrackingError>;

    /// Ends the session.
    fn end(&self, status: SessionStatus) -> Result<(), TrackingError>;
}

/// Opens tracking sessions.
pub trait ExperimentTracker: Send + Sync + Debug {
    /// Starts a session for `run_name` within `experiment`.
    fn start_session(
        &self,
        experiment: &str,
        run_name: &str,
    ) -> Result<Arc<dyn TrackingSession>, TrackingError>;
}

/// A tracker that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTracker;

/// The session handed out by [`NoOpTracker`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSession;

impl ExperimentTracker for NoOpTracker {
    fn start_session(&self, _experiment: &str, _run_name: &str) -> Result<Arc<dyn TrackingSession>, TrackingError> {
        Ok(Arc::new(NoOpSession))
    }
}

impl TrackingSession for NoOpSession {
    fn id(&self) -> &str {
        "noop"
    }

    fn log_param(&self, _key: &str, _value: &serde_json::Value) -> Result<(), TrackingError> {
        Ok(())
    }

    fn log_metric(&self, _key: &str, _value: f64) -> Result<(), TrackingError> {
        Ok(())
    }

    fn log_artifact(&self, _path: &Path, _artifact_path: Option<&str>) -> Result<(), TrackingError> {
        Ok(())
    }

    fn end(&self, _status: SessionStatus) -> Result<(), TrackingError> {
        Ok(())
    }
}

/// A tracker that writes everything to the log.
#[derive(Debug, Clone)]
pub struct LoggingTracker {
    level: Level,
}

impl Default for LoggingTracker {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingTracker {
    /// Creates a tracker logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl ExperimentTracker for LoggingTracker {
    fn start_session(&self, experiment: &str, run_name: &str) -> Result<Arc<dyn TrackingSession>, TrackingError> {
        let session = LoggingSession {
            id: uuid::Uuid::new_v4().to_string(),
            experiment: experiment.to_string(),
            level: self.level,
        };
        session.log(&format!("Session started for run {run_name}"));
        Ok(Arc::new(session))
    }
}

/// The session handed out by [`LoggingTracker`].
#[derive(Debug, Clone)]
pub struct LoggingSession {
    id: String,
    experiment: String,
    level: Level,
}

impl LoggingSession {
    fn log(&self, message: &str) {
        if self.level == Level::DEBUG {
            tracing::debug!(session = %self.id, experiment = %self.experiment, "{message}");
        } else {
            info!(session = %self.id, experiment = %self.experiment, "{message}");
        }
    }
}

impl TrackingSession for LoggingSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn log_param(&self, key: &str, value: &serde_json::Value) -> Result<(), TrackingError> {
        self.log(&format!("param {key} = {value}"));
        Ok(())
    }

    fn log_metric(&self, key: &str, value: f64) -> Result<(), TrackingError> {
        self.log(&format!("metric {key} = {value}"));
        Ok(())
    }

    fn log_artifact(&self, path: &Path, artifact_path: Option<&str>) -> Result<(), TrackingError> {
        self.log(&format!(
            "artifact {} under {}",
            path.display(),
            artifact_path.unwrap_or(".")
        ));
        Ok(())
    }

    fn end(&self, status: SessionStatus) -> Result<(), TrackingError> {
        self.log(&format!("Session ended: {status}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_tracker() {
        let session = NoOpTracker.start_session("exp", "run").unwrap();
        session.log_param("a", &serde_json::json!(1)).unwrap();
        session.log_metric("f1", 0.5).unwrap();
        session.log_artifact(Path::new("a.txt"), Some("group")).unwrap();
        session.end(SessionStatus::Finished).unwrap();
        assert_eq!(session.id(), "noop");
    }

    #[test]
    fn test_logging_tracker_ids_are_unique() {
        let tracker = LoggingTracker::new(Level::DEBUG);
        let a = tracker.start_session("exp", "run").unwrap();
        let b = tracker.start_session("exp", "run").unwrap();
        assert_ne!(a.id(), b.id());
        a.log_metric("f1", 0.5).unwrap();
        a.end(SessionStatus::Failed).unwrap();
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Finished.to_string(), "FINISHED");
        assert_eq!(
            serde_json::to_value(SessionStatus::Failed).unwrap(),
            serde_json::json!("FAILED")
        );
    }
}
