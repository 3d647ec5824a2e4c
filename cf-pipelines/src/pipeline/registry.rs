//! Function registry and lineage table.
//!
//! The two tables are only ever mutated together: registering a function
//! writes its details and one lineage entry per output, removing it deletes
//! both.

use crate::core::{remove_extension, FunctionDetails, ProductLineage};
use crate::functions::PipelineFunction;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registered functions and the artifacts they produce.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    /// Function name -> details.
    details: HashMap<String, FunctionDetails>,
    /// Registration order.
    order: Vec<String>,
    /// Artifact name -> lineage.
    lineage: HashMap<String, ProductLineage>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under `name`.
    ///
    /// Registering an existing name replaces its details and lineage
    /// entirely; the function keeps its position in registration order.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: Arc<dyn PipelineFunction>,
        group: impl Into<String>,
        needs: BTreeSet<String>,
        declared_outputs: &[String],
    ) {
        let name = name.into();
        let group = group.into();

        if self.details.contains_key(&name) {
            warn!(function = %name, "Function re-registered, previous declaration replaced");
            self.remove_lineage_of(&name);
        } else {
            self.order.push(name.clone());
        }

        let mut produces = BTreeSet::new();
        for key in declared_outputs {
            let artifact = remove_extension(key).to_string();
            let lineage = ProductLineage::new(group.clone(), key.clone(), name.clone());
            if let Some(previous) = self.lineage.insert(artifact.clone(), lineage) {
                if previous.produced_by != name {
                    warn!(
                        artifact = %artifact,
                        previous = %previous.produced_by,
                        current = %name,
                        "Artifact is now produced by a different function"
                    );
                }
            }
            produces.insert(artifact);
        }

        debug!(function = %name, group = %group, ?produces, ?needs, "Function registered");

        self.details.insert(
            name,
            FunctionDetails {
                function,
                produces,
                needs,
                group,
            },
        );
    }

    /// Removes a function and every artifact it produces.
    ///
    /// Returns the removed details, or `None` if the name is unknown.
    pub fn remove(&mut self, name: &str) -> Option<FunctionDetails> {
        let details = self.details.remove(name)?;
        self.order.retain(|n| n != name);
        self.remove_lineage_of(name);
        debug!(function = %name, "Function removed");
        Some(details)
    }

    fn remove_lineage_of(&mut self, name: &str) {
        self.lineage.retain(|_, lineage| lineage.produced_by != name);
    }

    /// Returns the details of a function.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FunctionDetails> {
        self.details.get(name)
    }

    /// Returns whether a function is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.details.contains_key(name)
    }

    /// Returns the lineage of an artifact.
    #[must_use]
    pub fn lineage(&self, artifact: &str) -> Option<&ProductLineage> {
        self.lineage.get(artifact)
    }

    /// Returns the whole lineage table.
    #[must_use]
    pub fn lineages(&self) -> &HashMap<String, ProductLineage> {
        &self.lineage
    }

    /// Returns the whole details table.
    #[must_use]
    pub fn details(&self) -> &HashMap<String, FunctionDetails> {
        &self.details
    }

    /// Returns function names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Iterates over functions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FunctionDetails)> {
        self.order
            .iter()
            .filter_map(|name| self.details.get(name).map(|d| (name.as_str(), d)))
    }

    /// Returns the number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.details.len()
    }

    /// Returns whether no function is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}
