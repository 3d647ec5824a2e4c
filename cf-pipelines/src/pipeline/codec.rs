//! Artifact persistence, dispatched on file extension.
//!
//! `.txt` files hold raw text, `.json` files hold pretty JSON and every other
//! extension falls back to MessagePack.

use crate::core::ArtifactValue;
use crate::errors::CodecError;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Reads and writes artifact values.
pub trait Codec: Send + Sync + Debug {
    /// Writes `value` to `destination`.
    fn write(&self, value: &ArtifactValue, destination: &Path) -> Result<(), CodecError>;

    /// Reads a value back from `source`.
    fn read(&self, source: &Path) -> Result<ArtifactValue, CodecError>;
}

fn write_bytes(destination: &Path, bytes: &[u8]) -> Result<(), CodecError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| CodecError::new(destination, e.to_string()))?;
    }
    fs::write(destination, bytes).map_err(|e| CodecError::new(destination, e.to_string()))
}

fn read_bytes(source: &Path) -> Result<Vec<u8>, CodecError> {
    fs::read(source).map_err(|e| CodecError::new(source, e.to_string()))
}

/// Plain text files.
///
/// Strings are written verbatim; anything else is written as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn write(&self, value: &ArtifactValue, destination: &Path) -> Result<(), CodecError> {
        let text = match value.as_str() {
            Some(text) => text.to_string(),
            None => value.to_json().to_string(),
        };
        write_bytes(destination, text.as_bytes())
    }

    fn read(&self, source: &Path) -> Result<ArtifactValue, CodecError> {
        let bytes = read_bytes(source)?;
        let text = String::from_utf8(bytes).map_err(|e| CodecError::new(source, e.to_string()))?;
        Ok(ArtifactValue::from(text))
    }
}

/// Pretty-printed JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn write(&self, value: &ArtifactValue, destination: &Path) -> Result<(), CodecError> {
        let bytes = serde_json::to_vec_pretty(&value.to_json())
            .map_err(|e| CodecError::new(destination, e.to_string()))?;
        write_bytes(destination, &bytes)
    }

    fn read(&self, source: &Path) -> Result<ArtifactValue, CodecError> {
        let bytes = read_bytes(source)?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| CodecError::new(source, e.to_string()))?;
        Ok(ArtifactValue::Json(value))
    }
}

/// MessagePack files; round-trips any [`ArtifactValue`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn write(&self, value: &ArtifactValue, destination: &Path) -> Result<(), CodecError> {
        let bytes =
            rmp_serde::to_vec_named(value).map_err(|e| CodecError::new(destination, e.to_string()))?;
        write_bytes(destination, &bytes)
    }

    fn read(&self, source: &Path) -> Result<ArtifactValue, CodecError> {
        let bytes = read_bytes(source)?;
        rmp_serde::from_slice(&bytes).map_err(|e| CodecError::new(source, e.to_string()))
    }
}

/// Extension -> codec table with a fallback.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    fallback: Arc<dyn Codec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty(Arc::new(BinaryCodec));
        registry.register("txt", Arc::new(TextCodec));
        registry.register("json", Arc::new(JsonCodec));
        registry
    }
}

impl CodecRegistry {
    /// Creates a registry with only a fallback codec.
    #[must_use]
    pub fn empty(fallback: Arc<dyn Codec>) -> Self {
        Self {
            codecs: HashMap::new(),
            fallback,
        }
    }

    /// Registers a codec for an extension, with or without the leading dot.
    pub fn register(&mut self, extension: &str, codec: Arc<dyn Codec>) {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.codecs.insert(extension, codec);
    }

    /// Returns the codec used for `path`.
    #[must_use]
    pub fn for_path(&self, path: &Path) -> &dyn Codec {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.codecs.get(&ext.to_ascii_lowercase()))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Writes a value with the codec matching `destination`.
    pub fn write(&self, value: &ArtifactValue, destination: &Path) -> Result<(), CodecError> {
        self.for_path(destination).write(value, destination)
    }

    /// Reads a value with the codec matching `source`.
    pub fn read(&self, source: &Path) -> Result<ArtifactValue, CodecError> {
        self.for_path(source).read(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{Expectation, Metric, ModelEvaluationResult};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_text_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("step_1").join("artifact_1.txt");
        let codecs = CodecRegistry::default();

        codecs.write(&ArtifactValue::from("Hello"), &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "Hello");
        assert_eq!(codecs.read(&path).unwrap().as_str(), Some("Hello"));
    }

    #[test]
    fn test_text_renders_non_strings_as_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("count.txt");

        CodecRegistry::default()
            .write(&ArtifactValue::from(json!([1, 2])), &path)
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2]");
    }

    #[test]
    fn test_json_codec() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        let codecs = CodecRegistry::default();
        let value = ArtifactValue::from(json!({"alpha": 0.5}));

        codecs.write(&value, &path).unwrap();

        assert_eq!(codecs.read(&path).unwrap(), value);
    }

    #[test]
    fn test_fallback_is_lossless() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evaluation.pkl");
        let codecs = CodecRegistry::default();
        let value = ArtifactValue::from(
            ModelEvaluationResult::new().metric(Metric::new("f1", 0.9, Expectation::GreaterThan(0.6))),
        );

        codecs.write(&value, &path).unwrap();

        assert_eq!(codecs.read(&path).unwrap(), value);
    }

    #[test]
    fn test_dispatch_uses_last_extension() {
        let codecs = CodecRegistry::default();
        let txt = format!("{:?}", codecs.for_path(Path::new("a.txt")));
        let gz = format!("{:?}", codecs.for_path(Path::new("a.txt.gz")));
        let none = format!("{:?}", codecs.for_path(Path::new("model")));

        assert_eq!(txt, "TextCodec");
        assert_eq!(gz, "BinaryCodec");
        assert_eq!(none, "BinaryCodec");
    }

    #[test]
    fn test_custom_codec_registration() {
        let mut codecs = CodecRegistry::default();
        codecs.register(".CSV", Arc::new(TextCodec));
        assert_eq!(format!("{:?}", codecs.for_path(Path::new("data.csv"))), "TextCodec");
    }

    #[test]
    fn test_read_missing_file_names_path() {
        let err = CodecRegistry::default()
            .read(Path::new("/nonexistent/artifact.txt"))
            .unwrap_err();
        assert_eq!(err.path, Path::new("/nonexistent/artifact.txt"));
    }
}
