use serde::{Deserialize, Serialize};
use crate::onnx;

#[derive(Debug, thiserror::Error)]
pub enum DTypeError {
    #[error("The onnx dtype {0:?} is not supported")]
    UnsupportedONNXDtype(onnx::tensor_proto::DataType),
    #[error("Unknown onnx dtype tag {0}")]
    UnknownONNXDtype(i32),
}

/// Native element types. Booleans travel as `U8` holding 0 or 1; the
/// exporter re-tags them as `BOOL` where ONNX needs it.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum DType {
    F64,
    F32,
    I64,
    I32,
    I8,
    U8,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            DType::F64 => 8,
            DType::F32 => 4,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::I8 => 1,
            DType::U8 => 1,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F64 | DType::F32)
    }

    /// Decode the `elem_type`/`data_type` tag carried by value infos and tensors.
    pub fn from_onnx_tag(tag: i32) -> Result<Self, DTypeError> {
        let onnx_dtype = onnx::tensor_proto::DataType::try_from(tag)
            .map_err(|_| DTypeError::UnknownONNXDtype(tag))?;
        DType::try_from(onnx_dtype)
    }
}

impl TryFrom<onnx::tensor_proto::DataType> for DType {
    type Error = DTypeError;
    fn try_from(onnx_dtype: onnx::tensor_proto::DataType) -> Result<Self, DTypeError> {
        Ok(match onnx_dtype {
            onnx::tensor_proto::DataType::Double => DType::F64,
            onnx::tensor_proto::DataType::Float => DType::F32,
            // Half precision is widened on load
            onnx::tensor_proto::DataType::Float16 => DType::F32,
            onnx::tensor_proto::DataType::Bfloat16 => DType::F32,
            onnx::tensor_proto::DataType::Int64 => DType::I64,
            onnx::tensor_proto::DataType::Int32 => DType::I32,
            onnx::tensor_proto::DataType::Int8 => DType::I8,
            onnx::tensor_proto::DataType::Uint8 => DType::U8,
            onnx::tensor_proto::DataType::Bool => DType::U8,
            _ => Err(DTypeError::UnsupportedONNXDtype(onnx_dtype))?
        })
    }
}

impl From<DType> for onnx::tensor_proto::DataType {
    fn from(dtype: DType) -> Self {
        match dtype {
            DType::F64 => onnx::tensor_proto::DataType::Double,
            DType::F32 => onnx::tensor_proto::DataType::Float,
            DType::I64 => onnx::tensor_proto::DataType::Int64,
            DType::I32 => onnx::tensor_proto::DataType::Int32,
            DType::I8 => onnx::tensor_proto::DataType::Int8,
            DType::U8 => onnx::tensor_proto::DataType::Uint8,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::F64 => write!(f, "Float64"),
            DType::F32 => write!(f, "Float32"),
            DType::I64 => write!(f, "Int64"),
            DType::I32 => write!(f, "Int32"),
            DType::I8 => write!(f, "Int8"),
            DType::U8 => write!(f, "UInt8"),
        }
    }
}

pub trait DTypeOfPrimitive {
    const DTYPE: DType;
}

impl DTypeOfPrimitive for f64 { const DTYPE: DType = DType::F64; }
impl DTypeOfPrimitive for f32 { const DTYPE: DType = DType::F32; }
impl DTypeOfPrimitive for i64 { const DTYPE: DType = DType::I64; }
impl DTypeOfPrimitive for i32 { const DTYPE: DType = DType::I32; }
impl DTypeOfPrimitive for i8 { const DTYPE: DType = DType::I8; }
impl DTypeOfPrimitive for u8 { const DTYPE: DType = DType::U8; }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_and_half_map_onto_native_types() {
        assert_eq!(DType::try_from(onnx::tensor_proto::DataType::Bool).unwrap(), DType::U8);
        assert_eq!(DType::try_from(onnx::tensor_proto::DataType::Float16).unwrap(), DType::F32);
        assert!(DType::try_from(onnx::tensor_proto::DataType::String).is_err());
        assert!(DType::from_onnx_tag(1234).is_err());
    }
}
