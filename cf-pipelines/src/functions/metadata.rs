//! Extraction of a function's inputs and outputs from its declaration.

use super::PipelineFunction;
use crate::core::remove_extension;
use crate::errors::DeclarationError;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// The validated inputs and outputs of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    /// Output keys, in declaration order.
    pub outputs: Vec<String>,
    /// Input artifact names.
    pub inputs: BTreeSet<String>,
}

impl ExtractedMetadata {
    /// Returns the artifact names of the outputs (extensions stripped).
    pub fn artifact_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|key| remove_extension(key))
    }
}

/// Extracts and validates a function's declared inputs and outputs.
///
/// # Errors
///
/// Returns a [`DeclarationError`] if the outputs are undeclared, empty,
/// not usable as file names or collide once extensions are stripped, or if
/// an input is not an identifier.
pub fn extract(function: &dyn PipelineFunction) -> Result<ExtractedMetadata, DeclarationError> {
    let name = function.name();
    let declaration = function.declaration();

    let produced = declaration
        .produced()
        .ok_or_else(|| DeclarationError::MissingOutputs {
            function: name.to_string(),
        })?;

    if produced.is_empty() {
        return Err(DeclarationError::EmptyOutputs {
            function: name.to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    for key in produced {
        if !is_valid_output_key(key) {
            return Err(DeclarationError::InvalidOutputKey {
                function: name.to_string(),
                key: key.clone(),
            });
        }
        let artifact = remove_extension(key);
        if !seen.insert(artifact) {
            return Err(DeclarationError::DuplicateArtifact {
                function: name.to_string(),
                artifact: artifact.to_string(),
            });
        }
    }

    let mut inputs = BTreeSet::new();
    for input in declaration.needed() {
        if !IDENTIFIER.is_match(input) {
            return Err(DeclarationError::InvalidInputName {
                function: name.to_string(),
                name: input.clone(),
            });
        }
        inputs.insert(input.clone());
    }

    Ok(ExtractedMetadata {
        outputs: produced.to_vec(),
        inputs,
    })
}

fn is_valid_output_key(key: &str) -> bool {
    !remove_extension(key).is_empty() && !key.contains(['/', '\\']) && key.trim() == key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{outputs, Arguments, Outputs};
    use crate::functions::{FnFunction, FunctionDeclaration};

    fn declared(name: &str, declaration: FunctionDeclaration) -> FnFunction<fn(&Arguments) -> anyhow::Result<Outputs>> {
        fn body(_: &Arguments) -> anyhow::Result<Outputs> {
            Ok(outputs([("unused", "x")]))
        }
        FnFunction::new(name, declaration, body as fn(&Arguments) -> anyhow::Result<Outputs>)
    }

    #[test]
    fn test_no_output_declaration_fails() {
        let function = declared("no_return_statement", FunctionDeclaration::new());
        assert!(matches!(
            extract(&function),
            Err(DeclarationError::MissingOutputs { .. })
        ));
    }

    #[test]
    fn test_empty_outputs_fail() {
        let function = declared(
            "returns_empty_dictionary",
            FunctionDeclaration::new().produces(Vec::<String>::new()),
        );
        assert!(matches!(
            extract(&function),
            Err(DeclarationError::EmptyOutputs { .. })
        ));
    }

    #[test]
    fn test_invalid_output_keys_fail() {
        for key in [".txt", "", "a/b.txt", " padded"] {
            let function = declared("bad", FunctionDeclaration::new().produces([key]));
            assert!(
                matches!(extract(&function), Err(DeclarationError::InvalidOutputKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_colliding_artifacts_fail() {
        let function = declared(
            "twice",
            FunctionDeclaration::new().produces(["hello.txt", "hello.png"]),
        );
        assert_eq!(
            extract(&function),
            Err(DeclarationError::DuplicateArtifact {
                function: "twice".to_string(),
                artifact: "hello".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_input_name_fails() {
        let function = declared(
            "bad_input",
            FunctionDeclaration::new().needs(["not-an-identifier"]).produces(["x"]),
        );
        assert!(matches!(
            extract(&function),
            Err(DeclarationError::InvalidInputName { .. })
        ));
    }

    #[test]
    fn test_single_key() {
        let function = declared("return_single_key", FunctionDeclaration::new().produces(["hello.txt"]));
        let metadata = extract(&function).unwrap();
        assert_eq!(metadata.outputs, vec!["hello.txt"]);
        assert!(metadata.inputs.is_empty());
    }

    #[test]
    fn test_multiple_keys_keep_declaration_order() {
        let function = declared(
            "return_multiple_keys",
            FunctionDeclaration::new()
                .needs(["_", "books"])
                .produces(["hello.txt", "world.png", "again"]),
        );
        let metadata = extract(&function).unwrap();
        assert_eq!(metadata.outputs, vec!["hello.txt", "world.png", "again"]);
        assert_eq!(metadata.artifact_names().collect::<Vec<_>>(), vec!["hello", "world", "again"]);
        assert_eq!(
            metadata.inputs,
            ["_", "books"].into_iter().map(String::from).collect()
        );
    }
}
