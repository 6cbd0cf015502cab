//! Model topology patch
//!
//! Older model exports name the input layer's shape `batch_shape`; loaders
//! expecting `batch_input_shape` reject them. This crate renames the key on
//! the first `InputLayer` of `modelTopology.model_config.config.layers`.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

pub const OLD_KEY: &str = "batch_shape";
pub const NEW_KEY: &str = "batch_input_shape";

/// Patch errors
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error parsing JSON structure: missing {0}")]
    Structure(String),
}

/// Whether the document was changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Renamed,
    Unchanged,
}

fn object_field<'a>(value: &'a mut Value, key: &str, path: &str) -> Result<&'a mut Value, PatchError> {
    value
        .as_object_mut()
        .and_then(|object| object.get_mut(key))
        .ok_or_else(|| PatchError::Structure(format!("{}.{}", path, key)))
}

/// Rename `batch_shape` in place on the first `InputLayer`.
///
/// The renamed key keeps its position. Any existing `batch_input_shape` on
/// that layer is replaced. Layers after the first `InputLayer` are untouched.
pub fn patch_value(document: &mut Value) -> Result<PatchOutcome, PatchError> {
    let topology = object_field(document, "modelTopology", "$")?;
    let model_config = object_field(topology, "model_config", "modelTopology")?;
    let config = object_field(model_config, "config", "modelTopology.model_config")?;
    let layers = object_field(config, "layers", "modelTopology.model_config.config")?
        .as_array_mut()
        .ok_or_else(|| PatchError::Structure("layers array".to_string()))?;

    for (i, layer) in layers.iter_mut().enumerate() {
        let class_name = layer
            .get("class_name")
            .ok_or_else(|| PatchError::Structure(format!("layers[{}].class_name", i)))?;
        if class_name != "InputLayer" {
            continue;
        }

        let layer_config = object_field(layer, "config", &format!("layers[{}]", i))?
            .as_object_mut()
            .ok_or_else(|| PatchError::Structure(format!("layers[{}].config object", i)))?;
        return Ok(rename_key(layer_config));
    }

    Ok(PatchOutcome::Unchanged)
}

fn rename_key(config: &mut Map<String, Value>) -> PatchOutcome {
    if !config.contains_key(OLD_KEY) {
        return PatchOutcome::Unchanged;
    }

    let entries = std::mem::take(config);
    for (key, value) in entries {
        if key == OLD_KEY {
            config.insert(NEW_KEY.to_string(), value);
        } else if key != NEW_KEY {
            config.insert(key, value);
        }
    }
    PatchOutcome::Renamed
}

/// Patch a model JSON file, writing it back only when the key was renamed
pub fn patch_file(path: impl AsRef<Path>) -> Result<PatchOutcome, PatchError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PatchError::NotFound(path.display().to_string()),
        _ => PatchError::Io(e),
    })?;
    let mut document: Value = serde_json::from_str(&text)?;
    info!("Loaded {}", path.display());

    let outcome = patch_value(&mut document)?;
    match outcome {
        PatchOutcome::Renamed => {
            info!("Renamed '{}' to '{}'", OLD_KEY, NEW_KEY);
            fs::write(path, serde_json::to_string(&document)?)?;
            info!("{} has been updated", path.display());
        }
        PatchOutcome::Unchanged => {
            warn!("'{}' not found, the file might already be fixed", OLD_KEY);
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{"modelTopology":{"model_config":{"config":{"layers":[{"class_name":"InputLayer","config":{"batch_shape":[null,224,224,3]}}]}}}}"#;

    fn input_config(document: &Value) -> &Map<String, Value> {
        document["modelTopology"]["model_config"]["config"]["layers"][0]["config"]
            .as_object()
            .unwrap()
    }

    #[test]
    fn test_renames_sample() {
        let mut document: Value = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(patch_value(&mut document).unwrap(), PatchOutcome::Renamed);

        let config = input_config(&document);
        assert_eq!(config.get(NEW_KEY), Some(&json!([null, 224, 224, 3])));
        assert!(!config.contains_key(OLD_KEY));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut once: Value = serde_json::from_str(SAMPLE).unwrap();
        patch_value(&mut once).unwrap();
        let mut twice = once.clone();

        assert_eq!(patch_value(&mut twice).unwrap(), PatchOutcome::Unchanged);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_key_position_preserved() {
        let mut document = json!({"modelTopology": {"model_config": {"config": {"layers": [
            {"class_name": "InputLayer", "config": {"name": "input_1", "batch_shape": [null, 8], "dtype": "float32"}}
        ]}}}});
        patch_value(&mut document).unwrap();

        let keys: Vec<&str> = input_config(&document).keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", NEW_KEY, "dtype"]);
    }

    #[test]
    fn test_only_first_input_layer() {
        let mut document = json!({"modelTopology": {"model_config": {"config": {"layers": [
            {"class_name": "Conv2D", "config": {"batch_shape": [1]}},
            {"class_name": "InputLayer", "config": {"batch_shape": [2]}},
            {"class_name": "InputLayer", "config": {"batch_shape": [3]}}
        ]}}}});
        patch_value(&mut document).unwrap();

        let layers = &document["modelTopology"]["model_config"]["config"]["layers"];
        assert_eq!(layers[0]["config"]["batch_shape"], json!([1]));
        assert_eq!(layers[1]["config"][NEW_KEY], json!([2]));
        assert_eq!(layers[2]["config"]["batch_shape"], json!([3]));
    }

    #[test]
    fn test_no_input_layer_is_unchanged() {
        let mut document = json!({"modelTopology": {"model_config": {"config": {"layers": [
            {"class_name": "Dense", "config": {}}
        ]}}}});
        assert_eq!(patch_value(&mut document).unwrap(), PatchOutcome::Unchanged);
    }

    #[test]
    fn test_missing_structure() {
        let mut document = json!({"modelTopology": {"model_config": {}}});
        assert!(matches!(
            patch_value(&mut document),
            Err(PatchError::Structure(path)) if path == "modelTopology.model_config.config"
        ));
    }

    #[test]
    fn test_patch_file_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, SAMPLE).unwrap();

        assert_eq!(patch_file(&path).unwrap(), PatchOutcome::Renamed);
        let patched = fs::read_to_string(&path).unwrap();
        assert!(patched.contains(NEW_KEY));
        assert!(!patched.contains("\"batch_shape\""));

        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(patch_file(&path).unwrap(), PatchOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), patched);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_rewrite_keeps_large_numbers_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(
            &path,
            r#"{"seed":123456789012345678901234,"lr":0.1000000000000000055511151231257827,"modelTopology":{"model_config":{"config":{"layers":[{"class_name":"InputLayer","config":{"batch_shape":[null,224,224,3]}}]}}}}"#,
        )
        .unwrap();

        assert_eq!(patch_file(&path).unwrap(), PatchOutcome::Renamed);
        let patched = fs::read_to_string(&path).unwrap();
        assert!(patched.contains(r#""seed":123456789012345678901234"#));
        assert!(patched.contains(r#""lr":0.1000000000000000055511151231257827"#));
        assert!(patched.contains(r#""batch_input_shape":[null,224,224,3]"#));
    }

    #[test]
    fn test_structure_error_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let original = r#"{"format": "layers-model"}"#;
        fs::write(&path, original).unwrap();

        assert!(matches!(patch_file(&path), Err(PatchError::Structure(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            patch_file(dir.path().join("model.json")),
            Err(PatchError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(patch_file(&path), Err(PatchError::Json(_))));
    }
}
