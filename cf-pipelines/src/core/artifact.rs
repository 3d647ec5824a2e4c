//! Artifact values and naming helpers.

use crate::ml::ModelEvaluationResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named values handed to a function, keyed by artifact name.
pub type Arguments = HashMap<String, ArtifactValue>;

/// Named values returned by a function.
///
/// A function returns its values keyed by the declared output keys
/// (`"model.bin"`); after dispatch they are re-keyed by artifact name
/// (`"model"`).
pub type Outputs = HashMap<String, ArtifactValue>;

/// The in-memory value of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactValue {
    /// Any JSON-representable value.
    Json(serde_json::Value),
    /// A model evaluation, inspected by the machine learning layer.
    Evaluation(ModelEvaluationResult),
}

impl ArtifactValue {
    /// Wraps a JSON value.
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json(value)
    }

    /// Returns the JSON value, if this is one.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Evaluation(_) => None,
        }
    }

    /// Returns the string, if this is a JSON string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(serde_json::Value::as_str)
    }

    /// Returns the number as `f64`, if this is a JSON number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(serde_json::Value::as_f64)
    }

    /// Returns the number as `i64`, if this is an integral JSON number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(serde_json::Value::as_i64)
    }

    /// Returns the evaluation, if this is one.
    #[must_use]
    pub fn as_evaluation(&self) -> Option<&ModelEvaluationResult> {
        match self {
            Self::Evaluation(result) => Some(result),
            Self::Json(_) => None,
        }
    }

    /// Renders the value as JSON.
    ///
    /// Evaluations render as their metric list.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Evaluation(result) => serde_json::to_value(result).unwrap_or_default(),
        }
    }
}

impl PartialEq for ArtifactValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Evaluation(a), Self::Evaluation(b)) => a.metrics == b.metrics,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for ArtifactValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for ArtifactValue {
    fn from(value: &str) -> Self {
        Self::Json(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for ArtifactValue {
    fn from(value: String) -> Self {
        Self::Json(serde_json::Value::String(value))
    }
}

impl From<f64> for ArtifactValue {
    fn from(value: f64) -> Self {
        Self::Json(serde_json::json!(value))
    }
}

impl From<i64> for ArtifactValue {
    fn from(value: i64) -> Self {
        Self::Json(serde_json::json!(value))
    }
}

impl From<i32> for ArtifactValue {
    fn from(value: i32) -> Self {
        Self::Json(serde_json::json!(value))
    }
}

impl From<bool> for ArtifactValue {
    fn from(value: bool) -> Self {
        Self::Json(serde_json::Value::Bool(value))
    }
}

impl From<ModelEvaluationResult> for ArtifactValue {
    fn from(value: ModelEvaluationResult) -> Self {
        Self::Evaluation(value)
    }
}

/// Strips the extension from an output key, keeping everything before the
/// first dot.
///
/// ```
/// use cf_pipelines::core::remove_extension;
///
/// assert_eq!(remove_extension("hello.txt.gz"), "hello");
/// ```
#[must_use]
pub fn remove_extension(file_name: &str) -> &str {
    file_name
        .split_once('.')
        .map_or(file_name, |(stem, _)| stem)
}

/// Builds an [`Outputs`] map from `(key, value)` pairs.
pub fn outputs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Outputs
where
    K: Into<String>,
    V: Into<ArtifactValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
