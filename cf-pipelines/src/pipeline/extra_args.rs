//! Values supplied to the graph from outside any function.
//!
//! An artifact that no function produces can still be needed, as long as it
//! is supplied here. Lookups check an environment variable named
//! `<prefix><NAME>` first and the static mapping second.

use crate::core::ArtifactValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default prefix of environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "CF_";

/// Looks up a variable by name.
pub type VariableLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where an extra argument was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraOrigin {
    /// An environment variable.
    Environment {
        /// The variable name.
        variable: String,
    },
    /// The static mapping given at construction.
    Static,
}

/// A resolved extra argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraArgument {
    /// The value.
    pub value: ArtifactValue,
    /// Where it came from.
    pub origin: ExtraOrigin,
}

/// Resolver of extra arguments.
#[derive(Clone)]
pub struct ExtraArguments {
    values: HashMap<String, ArtifactValue>,
    prefix: String,
    lookup: VariableLookup,
}

impl Default for ExtraArguments {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl fmt::Debug for ExtraArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraArguments")
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ExtraArguments {
    /// Creates a resolver over a static mapping, reading overrides from the
    /// process environment.
    #[must_use]
    pub fn new(values: HashMap<String, ArtifactValue>) -> Self {
        Self {
            values,
            prefix: DEFAULT_ENV_PREFIX.to_string(),
            lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Sets the override prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replaces the variable lookup.
    #[must_use]
    pub fn with_lookup(mut self, lookup: VariableLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Reads overrides from a fixed map instead of the process environment.
    #[must_use]
    pub fn with_variables(self, variables: HashMap<String, String>) -> Self {
        self.with_lookup(Arc::new(move |name| variables.get(name).cloned()))
    }

    /// Adds or replaces a static value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArtifactValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the override variable for an artifact name.
    #[must_use]
    pub fn override_variable(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_uppercase())
    }

    /// Resolves an extra argument.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ExtraArgument> {
        let variable = self.override_variable(name);
        if let Some(raw) = (self.lookup)(&variable) {
            return Some(ExtraArgument {
                value: ArtifactValue::from(raw),
                origin: ExtraOrigin::Environment { variable },
            });
        }

        self.values.get(name).map(|value| ExtraArgument {
            value: value.clone(),
            origin: ExtraOrigin::Static,
        })
    }

    /// Returns whether a value can be resolved for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}
