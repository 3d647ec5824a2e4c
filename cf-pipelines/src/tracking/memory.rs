//! A tracker keeping every session in memory.

use super::{ExperimentTracker, SessionStatus, TrackingSession};
use crate::errors::TrackingError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything logged to one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedRun {
    /// Session id.
    pub id: String,
    /// Experiment name.
    pub experiment: String,
    /// Run name.
    pub run_name: String,
    /// Logged parameters.
    pub params: BTreeMap<String, serde_json::Value>,
    /// Logged metrics, in logging order.
    pub metrics: Vec<(String, f64)>,
    /// Uploaded files and the sub-directory they were uploaded to.
    pub artifacts: Vec<(PathBuf, Option<String>)>,
    /// How the session ended, if it did.
    pub status: Option<SessionStatus>,
}

impl TrackedRun {
    /// Returns the last value logged for a metric.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }
}

/// A session recording into memory.
#[derive(Debug)]
pub struct InMemorySession {
    id: String,
    run: RwLock<TrackedRun>,
}

impl InMemorySession {
    /// Returns a copy of what was logged so far.
    #[must_use]
    pub fn snapshot(&self) -> TrackedRun {
        self.run.read().clone()
    }

    fn ensure_open(&self) -> Result<(), TrackingError> {
        match self.run.read().status {
            Some(status) => Err(TrackingError(format!("session {} already ended ({status})", self.id))),
            None => Ok(()),
        }
    }
}

impl TrackingSession for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn log_param(&self, key: &str, value: &serde_json::Value) -> Result<(), TrackingError> {
        self.ensure_open()?;
        self.run.write().params.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn log_metric(&self, key: &str, value: f64) -> Result<(), TrackingError> {
        self.ensure_open()?;
        self.run.write().metrics.push((key.to_string(), value));
        Ok(())
    }

    fn log_artifact(&self, path: &Path, artifact_path: Option<&str>) -> Result<(), TrackingError> {
        self.ensure_open()?;
        self.run
            .write()
            .artifacts
            .push((path.to_path_buf(), artifact_path.map(str::to_string)));
        Ok(())
    }

    fn end(&self, status: SessionStatus) -> Result<(), TrackingError> {
        self.ensure_open()?;
        self.run.write().status = Some(status);
        Ok(())
    }
}

/// Tracker recording every session it starts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTracker {
    sessions: Arc<RwLock<Vec<Arc<InMemorySession>>>>,
}

impl InMemoryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every session, in start order.
    #[must_use]
    pub fn runs(&self) -> Vec<TrackedRun> {
        self.sessions.read().iter().map(|s| s.snapshot()).collect()
    }

    /// Returns the most recently started session.
    #[must_use]
    pub fn last_run(&self) -> Option<TrackedRun> {
        self.sessions.read().last().map(|s| s.snapshot())
    }
}

impl ExperimentTracker for InMemoryTracker {
    fn start_session(&self, experiment: &str, run_name: &str) -> Result<Arc<dyn TrackingSession>, TrackingError> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(InMemorySession {
            id: id.clone(),
            run: RwLock::new(TrackedRun {
                id,
                experiment: experiment.to_string(),
                run_name: run_name.to_string(),
                ..TrackedRun::default()
            }),
        });
        self.sessions.write().push(Arc::clone(&session));
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_everything() {
        let tracker = InMemoryTracker::new();
        let session = tracker.start_session("Training", "default").unwrap();

        session.log_param("meta.train.time", &json!(0.25)).unwrap();
        session.log_metric("f1", 0.5).unwrap();
        session.log_metric("f1", 0.7).unwrap();
        session
            .log_artifact(Path::new("/tmp/model.bin"), Some("model_training"))
            .unwrap();
        session.end(SessionStatus::Finished).unwrap();

        let run = tracker.last_run().unwrap();
        assert_eq!(run.experiment, "Training");
        assert_eq!(run.run_name, "default");
        assert_eq!(run.params["meta.train.time"], json!(0.25));
        assert_eq!(run.metric("f1"), Some(0.7));
        assert_eq!(run.artifacts.len(), 1);
        assert_eq!(run.status, Some(SessionStatus::Finished));
    }

    #[test]
    fn test_ended_session_rejects_logging() {
        let tracker = InMemoryTracker::new();
        let session = tracker.start_session("e", "r").unwrap();
        session.end(SessionStatus::Failed).unwrap();

        assert!(session.log_metric("f1", 0.1).is_err());
        assert!(session.end(SessionStatus::Finished).is_err());
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let tracker = InMemoryTracker::new();
        tracker.start_session("e", "1").unwrap();
        tracker.start_session("e", "2").unwrap();

        let runs = tracker.runs();
        assert_eq!(runs.len(), 2);
        assert_ne!(runs[0].id, runs[1].id);
    }
}
