//! Pipeline functions and their declarations.
//!
//! Functions are the units of work of a pipeline. Each one declares the
//! artifacts it needs and the output keys it produces; the pipeline wires
//! them together by matching names.

pub mod metadata;

use crate::core::{Arguments, ArtifactValue, Outputs};
use std::fmt::Debug;
use std::sync::Arc;

pub use metadata::{extract, ExtractedMetadata};

/// What a function consumes and produces.
///
/// `needs` are artifact names (identifiers). `produces` are output keys,
/// which may carry a file extension (`"model.bin"`). A declaration without
/// `produces` is rejected at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDeclaration {
    needs: Vec<String>,
    produces: Option<Vec<String>>,
}

impl FunctionDeclaration {
    /// Creates an empty declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the needed artifact names.
    #[must_use]
    pub fn needs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.needs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the produced output keys.
    #[must_use]
    pub fn produces(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.produces = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the needed artifact names.
    #[must_use]
    pub fn needed(&self) -> &[String] {
        &self.needs
    }

    /// Returns the produced output keys, if declared.
    #[must_use]
    pub fn produced(&self) -> Option<&[String]> {
        self.produces.as_deref()
    }
}

/// Trait for pipeline functions.
pub trait PipelineFunction: Send + Sync + Debug {
    /// Returns the name of the function.
    fn name(&self) -> &str;

    /// Returns what the function needs and produces.
    fn declaration(&self) -> &FunctionDeclaration;

    /// Calls the function.
    ///
    /// `args` holds one value per needed artifact. The returned map must be
    /// keyed by exactly the declared output keys.
    fn call(&self, args: &Arguments) -> anyhow::Result<Outputs>;
}

/// A closure-based function.
pub struct FnFunction<F>
where
    F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync,
{
    name: String,
    declaration: FunctionDeclaration,
    func: F,
}

impl<F> FnFunction<F>
where
    F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync,
{
    /// Creates a new closure-based function.
    pub fn new(name: impl Into<String>, declaration: FunctionDeclaration, func: F) -> Self {
        Self {
            name: name.into(),
            declaration,
            func,
        }
    }
}

impl<F> Debug for FnFunction<F>
where
    F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFunction")
            .field("name", &self.name)
            .field("declaration", &self.declaration)
            .finish()
    }
}

impl<F> PipelineFunction for FnFunction<F>
where
    F: Fn(&Arguments) -> anyhow::Result<Outputs> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn declaration(&self) -> &FunctionDeclaration {
        &self.declaration
    }

    fn call(&self, args: &Arguments) -> anyhow::Result<Outputs> {
        (self.func)(args)
    }
}

/// Handle returned by registration.
///
/// The registered function stays callable on its own, outside any graph.
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    function: Arc<dyn PipelineFunction>,
}

impl FunctionHandle {
    /// Wraps a function.
    #[must_use]
    pub fn new(function: Arc<dyn PipelineFunction>) -> Self {
        Self { function }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.function.name()
    }

    /// Returns the underlying function.
    #[must_use]
    pub fn function(&self) -> Arc<dyn PipelineFunction> {
        Arc::clone(&self.function)
    }

    /// Calls the function directly.
    pub fn call(&self, args: &Arguments) -> anyhow::Result<Outputs> {
        self.function.call(args)
    }

    /// Calls the function with named arguments.
    pub fn call_with<K, V>(&self, args: impl IntoIterator<Item = (K, V)>) -> anyhow::Result<Outputs>
    where
        K: Into<String>,
        V: Into<ArtifactValue>,
    {
        let args: Arguments = args
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.function.call(&args)
    }
}

/// Looks up a needed argument, failing with a readable error when absent.
pub fn require<'a>(args: &'a Arguments, name: &str) -> anyhow::Result<&'a ArtifactValue> {
    args.get(name)
        .ok_or_else(|| anyhow::anyhow!("missing argument '{name}'"))
}
