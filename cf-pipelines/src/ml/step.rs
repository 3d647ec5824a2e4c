//! The canonical machine learning steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A step of a machine learning pipeline; used as the function group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineLearningStep {
    /// Loading raw data.
    DataIngestion,
    /// Checking the raw data.
    DataValidation,
    /// Turning data into features.
    FeatureEngineering,
    /// Fitting models.
    ModelTraining,
    /// Evaluating models.
    ModelTesting,
    /// Shipping models.
    ModelDeployment,
}

impl MachineLearningStep {
    /// Every step, in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::DataIngestion,
        Self::DataValidation,
        Self::FeatureEngineering,
        Self::ModelTraining,
        Self::ModelTesting,
        Self::ModelDeployment,
    ];

    /// Returns the snake case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataIngestion => "data_ingestion",
            Self::DataValidation => "data_validation",
            Self::FeatureEngineering => "feature_engineering",
            Self::ModelTraining => "model_training",
            Self::ModelTesting => "model_testing",
            Self::ModelDeployment => "model_deployment",
        }
    }

    /// Returns whether a complete pipeline must have this step.
    #[must_use]
    pub fn is_mandatory(self) -> bool {
        !matches!(self, Self::ModelDeployment)
    }

    /// Returns the mandatory steps.
    pub fn mandatory() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(|step| step.is_mandatory())
    }
}

impl fmt::Display for MachineLearningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineLearningStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown machine learning step '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for step in MachineLearningStep::ALL {
            assert_eq!(step.as_str().parse::<MachineLearningStep>().unwrap(), step);
            assert_eq!(
                serde_json::to_value(step).unwrap(),
                serde_json::json!(step.as_str())
            );
        }
        assert!("deployment".parse::<MachineLearningStep>().is_err());
    }

    #[test]
    fn test_only_deployment_is_optional() {
        let mandatory: Vec<_> = MachineLearningStep::mandatory().collect();
        assert_eq!(mandatory.len(), 5);
        assert!(!mandatory.contains(&MachineLearningStep::ModelDeployment));
    }
}
