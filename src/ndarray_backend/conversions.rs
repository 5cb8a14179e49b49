use half::{bf16, f16};
use ndarray::{ArcArray, IxDyn};
use crate::dtype::{DType, DTypeError, DTypeOfPrimitive};
use crate::ndarray_backend::numeric_tensor::checked_num_elements;
use crate::ndarray_backend::{NDArrayNumericTensor, NDArrayNumericTensorError};
use crate::onnx;

pub trait NDArrayNumericTensorType: Sized + DTypeOfPrimitive + Clone {
    fn ndarray_numeric_tensor_from_parts(v: Vec<Self>, shape: &[usize]) -> Result<NDArrayNumericTensor, NDArrayNumericTensorError>;
    fn ndarray_numeric_tensor_inner(tensor: &NDArrayNumericTensor) -> Result<&ArcArray<Self, IxDyn>, NDArrayNumericTensorError>;
    fn ndarray_numeric_tensor_from_ndarray(value: ArcArray<Self, IxDyn>) -> NDArrayNumericTensor;
}

impl NDArrayNumericTensor {
    pub fn from_vec_shape<T: NDArrayNumericTensorType>(v: Vec<T>, shape: &[usize]) -> Result<Self, NDArrayNumericTensorError> {
        T::ndarray_numeric_tensor_from_parts(v, shape)
    }

    pub fn from_vec<T: NDArrayNumericTensorType>(v: Vec<T>) -> Self {
        T::ndarray_numeric_tensor_from_ndarray(ArcArray::from_vec(v).into_dyn())
    }

    pub fn from_ndarray<T: NDArrayNumericTensorType>(value: ArcArray<T, IxDyn>) -> Self {
        T::ndarray_numeric_tensor_from_ndarray(value)
    }

    /// Flattened copy of the elements in logical (row-major) order.
    pub fn try_to_vec<T: NDArrayNumericTensorType>(&self) -> Result<Vec<T>, NDArrayNumericTensorError> {
        Ok(T::ndarray_numeric_tensor_inner(self)?.iter().cloned().collect())
    }

    pub fn as_inner<T: NDArrayNumericTensorType>(&self) -> Result<&ArcArray<T, IxDyn>, NDArrayNumericTensorError> {
        T::ndarray_numeric_tensor_inner(self)
    }
}

impl<T: NDArrayNumericTensorType> From<Vec<T>> for NDArrayNumericTensor {
    fn from(value: Vec<T>) -> Self {
        NDArrayNumericTensor::from_vec(value)
    }
}

impl<T: NDArrayNumericTensorType> TryFrom<NDArrayNumericTensor> for Vec<T> {
    type Error = NDArrayNumericTensorError;

    fn try_from(value: NDArrayNumericTensor) -> Result<Self, Self::Error> {
        value.try_to_vec()
    }
}

macro_rules! impl_type_ndarray_backend {
    ($a:ident, $b:ident) => {
        impl NDArrayNumericTensorType for $a
        {
            fn ndarray_numeric_tensor_from_parts(v: Vec<Self>, shape: &[usize]) -> Result<NDArrayNumericTensor, NDArrayNumericTensorError> {
                Ok(NDArrayNumericTensor::$b(ArcArray::from_shape_vec(IxDyn(shape), v)?))
            }

            fn ndarray_numeric_tensor_inner(tensor: &NDArrayNumericTensor) -> Result<&ArcArray<Self, IxDyn>, NDArrayNumericTensorError> {
                if let NDArrayNumericTensor::$b(x) = tensor {
                    Ok(x)
                }
                else {
                    Err(NDArrayNumericTensorError::WrongDTypeError(Self::DTYPE, tensor.dtype()))
                }
            }

            fn ndarray_numeric_tensor_from_ndarray(value: ArcArray<Self, IxDyn>) -> NDArrayNumericTensor {
                NDArrayNumericTensor::$b(value)
            }
        }
    }
}

impl_type_ndarray_backend!(f64, F64);
impl_type_ndarray_backend!(f32, F32);
impl_type_ndarray_backend!(i64, I64);
impl_type_ndarray_backend!(i32, I32);
impl_type_ndarray_backend!(i8, I8);
impl_type_ndarray_backend!(u8, U8);

fn widen_half_bits(bits: impl Iterator<Item = u16>, onnx_dtype: onnx::tensor_proto::DataType) -> Vec<f32> {
    if onnx_dtype == onnx::tensor_proto::DataType::Bfloat16 {
        bits.map(|b| bf16::from_bits(b).to_f32()).collect()
    } else {
        bits.map(|b| f16::from_bits(b).to_f32()).collect()
    }
}

impl TryFrom<&onnx::TensorProto> for NDArrayNumericTensor {
    type Error = NDArrayNumericTensorError;

    fn try_from(tensor: &onnx::TensorProto) -> Result<Self, Self::Error> {
        let onnx_dtype = onnx::tensor_proto::DataType::try_from(tensor.data_type)
            .map_err(|_| DTypeError::UnknownONNXDtype(tensor.data_type))?;
        let dtype = DType::try_from(onnx_dtype)?;
        let shape = tensor.dims.iter()
            .map(|&d| usize::try_from(d).map_err(|_| NDArrayNumericTensorError::UnsupportedTensorData(format!("negative dimension {d}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let num_elements = checked_num_elements(&shape)?;

        if tensor.data_location == Some(onnx::tensor_proto::DataLocation::External as i32) {
            return Err(NDArrayNumericTensorError::UnsupportedTensorData(format!("external data for {}", tensor.name)));
        }

        let is_half = matches!(onnx_dtype, onnx::tensor_proto::DataType::Float16 | onnx::tensor_proto::DataType::Bfloat16);

        if !tensor.raw_data.is_empty() {
            if is_half {
                if num_elements.checked_mul(2) != Some(tensor.raw_data.len()) {
                    return Err(NDArrayNumericTensorError::InvalidRawData(tensor.raw_data.len(), num_elements, dtype));
                }
                let bits = tensor.raw_data.chunks_exact(2).map(|x| u16::from_le_bytes([x[0], x[1]]));
                return Self::from_vec_shape(widen_half_bits(bits, onnx_dtype), &shape);
            }
            let value = Self::from_raw_data(&tensor.raw_data, dtype, shape)?;
            return Ok(if onnx_dtype == onnx::tensor_proto::DataType::Bool { value.to_bool() } else { value });
        }

        if !tensor.float_data.is_empty() {
            Self::from_vec_shape(tensor.float_data.clone(), &shape)
        } else if !tensor.double_data.is_empty() {
            Self::from_vec_shape(tensor.double_data.clone(), &shape)
        } else if !tensor.int64_data.is_empty() {
            Self::from_vec_shape(tensor.int64_data.clone(), &shape)
        } else if !tensor.int32_data.is_empty() {
            // int32_data carries every narrow type, including half bit patterns
            let data = &tensor.int32_data;
            match onnx_dtype {
                onnx::tensor_proto::DataType::Int32 => Self::from_vec_shape(data.clone(), &shape),
                onnx::tensor_proto::DataType::Int8 => Self::from_vec_shape(data.iter().map(|&x| x as i8).collect::<Vec<_>>(), &shape),
                onnx::tensor_proto::DataType::Uint8 => Self::from_vec_shape(data.iter().map(|&x| x as u8).collect::<Vec<_>>(), &shape),
                onnx::tensor_proto::DataType::Bool => Self::from_vec_shape(data.iter().map(|&x| (x != 0) as u8).collect::<Vec<_>>(), &shape),
                _ if is_half => Self::from_vec_shape(widen_half_bits(data.iter().map(|&x| x as u16), onnx_dtype), &shape),
                _ => Err(NDArrayNumericTensorError::UnsupportedTensorData(format!("int32_data for {onnx_dtype:?}"))),
            }
        } else if num_elements == 0 {
            Ok(Self::zeros(dtype, &shape))
        } else {
            Err(NDArrayNumericTensorError::UnsupportedTensorData(format!("no data for tensor {}", tensor.name)))
        }
    }
}

impl NDArrayNumericTensor {
    /// Serialize as an ONNX tensor with raw little-endian data. `as_bool`
    /// re-tags a 0/1 `U8` buffer as ONNX `BOOL`.
    pub fn to_tensor_proto(&self, name: &str, as_bool: bool) -> onnx::TensorProto {
        let data_type = if as_bool && self.dtype() == DType::U8 {
            onnx::tensor_proto::DataType::Bool
        } else {
            onnx::tensor_proto::DataType::from(self.dtype())
        };
        let raw_data = if as_bool { self.to_bool().to_raw_data() } else { self.to_raw_data() };
        onnx::TensorProto {
            dims: self.shape().iter().map(|&d| d as i64).collect(),
            data_type: data_type as i32,
            name: name.to_string(),
            raw_data,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_tensor_protos_decode_to_zero_one_bytes() {
        let proto = onnx::TensorProto {
            dims: vec![3],
            data_type: onnx::tensor_proto::DataType::Bool as i32,
            int32_data: vec![1, 0, 7],
            ..Default::default()
        };
        let tensor = NDArrayNumericTensor::try_from(&proto).unwrap();
        assert_eq!(tensor.try_to_vec::<u8>().unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn half_raw_data_widens_to_f32() {
        let values = [1.5f32, -2.0, 0.25];
        let raw: Vec<u8> = values.iter().flat_map(|&v| f16::from_f32(v).to_bits().to_le_bytes()).collect();
        let proto = onnx::TensorProto {
            dims: vec![3],
            data_type: onnx::tensor_proto::DataType::Float16 as i32,
            raw_data: raw,
            ..Default::default()
        };
        let tensor = NDArrayNumericTensor::try_from(&proto).unwrap();
        assert_eq!(tensor.dtype(), DType::F32);
        assert_eq!(tensor.try_to_vec::<f32>().unwrap(), values.to_vec());
    }

    #[test]
    fn tensor_proto_preserves_scalars() {
        let tensor = NDArrayNumericTensor::from_vec_shape(vec![42i64], &[]).unwrap();
        let proto = tensor.to_tensor_proto("answer", false);
        assert!(proto.dims.is_empty());
        assert_eq!(NDArrayNumericTensor::try_from(&proto).unwrap(), tensor);
    }
}
