//! Per-function and per-artifact bookkeeping records.

use crate::functions::PipelineFunction;
use crate::pipeline::ExtraArgument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Everything the registry knows about one registered function.
#[derive(Clone)]
pub struct FunctionDetails {
    /// The callable.
    pub function: Arc<dyn PipelineFunction>,
    /// Artifact names the function produces (extensions stripped).
    pub produces: BTreeSet<String>,
    /// Artifact names the function needs.
    pub needs: BTreeSet<String>,
    /// The logical group the function belongs to.
    pub group: String,
}

impl FunctionDetails {
    /// Creates a new details record.
    #[must_use]
    pub fn new(
        function: Arc<dyn PipelineFunction>,
        produces: impl IntoIterator<Item = impl Into<String>>,
        needs: impl IntoIterator<Item = impl Into<String>>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            function,
            produces: produces.into_iter().map(Into::into).collect(),
            needs: needs.into_iter().map(Into::into).collect(),
            group: group.into(),
        }
    }
}

impl fmt::Debug for FunctionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDetails")
            .field("function", &self.function.name())
            .field("produces", &self.produces)
            .field("needs", &self.needs)
            .field("group", &self.group)
            .finish()
    }
}

impl PartialEq for FunctionDetails {
    fn eq(&self, other: &Self) -> bool {
        self.function.name() == other.function.name()
            && self.produces == other.produces
            && self.needs == other.needs
            && self.group == other.group
    }
}

/// Where a produced artifact lives and who produces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductLineage {
    /// The group of the producing function; a directory on disk.
    pub group: String,
    /// The on-disk file name, extension included.
    pub file_name: String,
    /// The producing function.
    pub produced_by: String,
}

impl ProductLineage {
    /// Creates a new lineage record.
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        file_name: impl Into<String>,
        produced_by: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            file_name: file_name.into(),
            produced_by: produced_by.into(),
        }
    }
}

/// Where an input artifact comes from.
///
/// A produced artifact shadows an externally supplied value of the same name.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactSource {
    /// Produced by a registered function.
    Produced(ProductLineage),
    /// Supplied from outside the graph.
    External(ExtraArgument),
}

impl ArtifactSource {
    /// Returns the producing function, if any.
    #[must_use]
    pub fn producer(&self) -> Option<&str> {
        match self {
            Self::Produced(lineage) => Some(&lineage.produced_by),
            Self::External(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_serialization() {
        let lineage = ProductLineage::new("data_ingestion", "machine.txt", "original function");
        let json = serde_json::to_value(&lineage).unwrap();
        assert_eq!(json["file_name"], "machine.txt");
        assert_eq!(json["produced_by"], "original function");
    }

    #[test]
    fn test_source_producer() {
        let produced = ArtifactSource::Produced(ProductLineage::new("g", "a.txt", "one"));
        assert_eq!(produced.producer(), Some("one"));
    }
}
