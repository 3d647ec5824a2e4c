//! Configuration types for pipelines.

use crate::errors::PipelineError;
use crate::ml::CompletenessPolicy;
use crate::pipeline::DEFAULT_ENV_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration of a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    pub name: String,
    /// Root directory of every run.
    #[serde(default = "default_location")]
    pub location: PathBuf,
    /// Whether every run gets its own timestamped directory.
    #[serde(default)]
    pub track_all: bool,
    /// Prefix of environment overrides for extra arguments.
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    /// Values for inputs no function produces.
    #[serde(default)]
    pub extra_args: HashMap<String, serde_json::Value>,
    /// Maximum number of functions running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_location() -> PathBuf {
    PathBuf::from(".pipelines")
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

fn default_max_concurrency() -> usize {
    1
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: default_location(),
            track_all: false,
            env_prefix: default_env_prefix(),
            extra_args: HashMap::new(),
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Config("pipeline name must not be empty".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(PipelineError::Config("max_concurrency must be at least 1".to_string()));
        }
        Ok(())
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

    /// Sets the environment override prefix.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Adds an extra argument.
    #[must_use]
    pub fn with_extra_arg(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra_args.insert(name.into(), value.into());
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Configuration of an [`MlPipeline`](crate::ml::MlPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPipelineConfig {
    /// The underlying pipeline configuration.
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    /// What to do when mandatory steps are missing.
    #[serde(default)]
    pub completeness: CompletenessPolicy,
    /// Whether metrics are also sent to the tracking session.
    #[serde(default)]
    pub log_metrics_to_tracker: bool,
}

impl MlPipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            pipeline: PipelineConfig::new(name),
            completeness: CompletenessPolicy::default(),
            log_metrics_to_tracker: false,
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Sets the underlying pipeline configuration.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sets the completeness policy.
    #[must_use]
    pub fn with_completeness(mut self, policy: CompletenessPolicy) -> Self {
        self.completeness = policy;
        self
    }

    /// Enables or disables logging metrics to the tracking session.
    #[must_use]
    pub fn with_log_metrics_to_tracker(mut self, enabled: bool) -> Self {
        self.log_metrics_to_tracker = enabled;
        self
    }
}
