//! Dependency inference by name.

use super::{ExtraArguments, FunctionRegistry};
use crate::core::ArtifactSource;
use crate::errors::UnresolvedInputError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Function name -> names of the functions it depends on.
pub type DependencyMap = BTreeMap<String, BTreeSet<String>>;

/// Finds where an artifact comes from.
///
/// Produced artifacts win over extra arguments of the same name.
#[must_use]
pub fn source_of(
    registry: &FunctionRegistry,
    extra: &ExtraArguments,
    artifact: &str,
) -> Option<ArtifactSource> {
    if let Some(lineage) = registry.lineage(artifact) {
        return Some(ArtifactSource::Produced(lineage.clone()));
    }
    extra.resolve(artifact).map(ArtifactSource::External)
}

/// Computes the prerequisites of every registered function.
///
/// Functions without prerequisites are left out of the map. A function that
/// needs its own output is listed as its own prerequisite, so that graph
/// building reports the cycle.
///
/// # Errors
///
/// Returns [`UnresolvedInputError`] for the first input, in registration
/// order, that is neither produced nor supplied.
pub fn solve_dependencies(
    registry: &FunctionRegistry,
    extra: &ExtraArguments,
) -> Result<DependencyMap, UnresolvedInputError> {
    let mut dependencies = DependencyMap::new();

    for (name, details) in registry.iter() {
        let mut prerequisites = BTreeSet::new();

        for artifact in &details.needs {
            match source_of(registry, extra, artifact) {
                Some(ArtifactSource::Produced(lineage)) => {
                    trace!(function = name, artifact = %artifact, producer = %lineage.produced_by, "Input produced in graph");
                    prerequisites.insert(lineage.produced_by);
                }
                Some(ArtifactSource::External(argument)) => {
                    trace!(function = name, artifact = %artifact, origin = ?argument.origin, "Input supplied externally");
                }
                None => return Err(UnresolvedInputError::new(name, artifact.clone())),
            }
        }

        if !prerequisites.is_empty() {
            dependencies.insert(name.to_string(), prerequisites);
        }
    }

    Ok(dependencies)
}
