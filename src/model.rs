use serde::{Deserialize, Serialize};

use crate::export::ONNXEncodingError;
use crate::graph::ops::EvalError;
use crate::import::ONNXDecodingError;
use crate::onnx::{ModelProto, StringStringEntryProto};
use crate::runner::ReplayError;

/// ONNX IR (format) version the converter reads and writes.
pub const SUPPORTED_IR_VERSION: i64 = 6;
/// Default-domain (`""` / `ai.onnx`) opset.
pub const SUPPORTED_DEFAULT_OPSET: i64 = 11;
pub const ML_DOMAIN: &str = "ai.onnx.ml";
pub const SUPPORTED_ML_OPSET: i64 = 2;

/// `metadata_props` key of the JSON [`ModelMetadata`] record.
pub const METADATA_KEY: &str = "onnx_bridge_metadata";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    ONNXDecodingError(#[from] ONNXDecodingError),
    #[error(transparent)]
    ONNXEncodingError(#[from] ONNXEncodingError),
    #[error(transparent)]
    ReplayError(#[from] ReplayError),
    #[error(transparent)]
    EvalError(#[from] EvalError),
    #[error(transparent)]
    SerdeJSONError(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Converter-specific facts ONNX has no field for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
    /// Initializers that were trainable parameters when exported.
    pub trainable: Vec<String>,
    pub exporter_version: String,
}

impl ModelMetadata {
    pub fn from_model(model: &ModelProto) -> Result<Option<Self>, serde_json::Error> {
        model
            .metadata_props
            .iter()
            .find(|StringStringEntryProto { key, .. }| key == METADATA_KEY)
            .map(|entry| serde_json::from_str(&entry.value))
            .transpose()
    }

    pub fn to_entry(&self) -> Result<StringStringEntryProto, serde_json::Error> {
        Ok(StringStringEntryProto {
            key: METADATA_KEY.to_string(),
            value: serde_json::to_string(self)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_found_among_other_props() {
        let metadata = ModelMetadata {
            trainable: vec!["w".to_string()],
            exporter_version: "0.1.0".to_string(),
        };
        let model = ModelProto {
            metadata_props: vec![
                StringStringEntryProto {
                    key: "author".to_string(),
                    value: "someone".to_string(),
                },
                metadata.to_entry().unwrap(),
            ],
            ..Default::default()
        };
        assert_eq!(ModelMetadata::from_model(&model).unwrap(), Some(metadata));
        assert_eq!(ModelMetadata::from_model(&ModelProto::default()).unwrap(), None);
    }
}
