//! Run identifiers and on-disk artifact locations.
//!
//! Every artifact lives at `location / run_segment / group / file_name`.
//! The run segment is `default` for untracked pipelines, or a UTC timestamp
//! with microsecond resolution when every run is tracked separately.

use crate::core::ProductLineage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Run segment used when runs are not tracked individually.
pub const DEFAULT_RUN_SEGMENT: &str = "default";

/// Format of tracked run segments; lexically sortable.
pub const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// Identifies the run artifacts are written for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunId {
    /// The shared `default` slot.
    #[default]
    Default,
    /// A run tracked under its own timestamp.
    Tracked(String),
}

impl RunId {
    /// Generates a tracked run id from the current time.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Builds a tracked run id from a given instant.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Tracked(at.format(RUN_ID_FORMAT).to_string())
    }

    /// Returns the path segment for this run.
    #[must_use]
    pub fn segment(&self) -> &str {
        match self {
            Self::Default => DEFAULT_RUN_SEGMENT,
            Self::Tracked(stamp) => stamp,
        }
    }

    /// Returns whether this is a tracked run.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Computes artifact paths for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    location: PathBuf,
    run_id: RunId,
}

impl ArtifactLocator {
    /// Creates a locator rooted at `location`.
    #[must_use]
    pub fn new(location: impl Into<PathBuf>, run_id: RunId) -> Self {
        Self {
            location: location.into(),
            run_id,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the directory holding every artifact of the run.
    #[must_use]
    pub fn run_directory(&self) -> PathBuf {
        self.location.join(self.run_id.segment())
    }

    /// Returns the path of a produced artifact.
    #[must_use]
    pub fn path_for(&self, lineage: &ProductLineage) -> PathBuf {
        self.run_directory()
            .join(&lineage.group)
            .join(&lineage.file_name)
    }

    /// Returns the root location.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_segment() {
        assert_eq!(RunId::Default.segment(), "default");
        assert!(!RunId::Default.is_tracked());
    }

    #[test]
    fn test_tracked_segment_format() {
        let at = Utc.with_ymd_and_hms(2022, 1, 14, 3, 21, 34).unwrap();
        let run_id = RunId::from_datetime(at);
        assert_eq!(run_id.segment(), "20220114032134000000");
        assert!(run_id.is_tracked());
    }

    #[test]
    fn test_tracked_segments_sort_chronologically() {
        let earlier = RunId::from_datetime(Utc.with_ymd_and_hms(2022, 1, 14, 3, 21, 34).unwrap());
        let later = RunId::from_datetime(Utc.with_ymd_and_hms(2022, 11, 2, 0, 0, 0).unwrap());
        assert!(earlier.segment() < later.segment());
    }

    #[test]
    fn test_path_for() {
        let locator = ArtifactLocator::new(".pipelines", RunId::Default);
        let lineage = ProductLineage::new("step_2", "artifact_2.csv", "two");
        assert_eq!(
            locator.path_for(&lineage),
            PathBuf::from(".pipelines/default/step_2/artifact_2.csv")
        );
    }
}
