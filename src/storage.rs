use std::path::Path;

use prost::Message;

use crate::import::ONNXDecodingError;
use crate::model::ModelError;
use crate::onnx::ModelProto;

pub fn decode_model(bytes: &[u8]) -> Result<ModelProto, ONNXDecodingError> {
    ModelProto::decode(bytes).map_err(|x| ONNXDecodingError::ProtobufDecodeError(anyhow::Error::from(x)))
}

pub fn encode_model(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

pub fn load_model_file(path: impl AsRef<Path>) -> Result<ModelProto, ModelError> {
    let path = path.as_ref();
    log::debug!("Loading ONNX model from {}", path.display());
    let bytes = std::fs::read(path)?;
    Ok(decode_model(&bytes)?)
}

pub fn save_model_file(model: &ModelProto, path: impl AsRef<Path>) -> Result<(), ModelError> {
    let path = path.as_ref();
    log::debug!("Saving ONNX model to {}", path.display());
    std::fs::write(path, encode_model(model))?;
    Ok(())
}
