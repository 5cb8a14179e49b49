use ndarray::{ArcArray, IxDyn};
use num_traits::{AsPrimitive, Zero};
use rand::Rng;
use crate::dtype::{DType, DTypeError};
use super::ops;
use super::ops::Window2d;

#[derive(Debug, thiserror::Error)]
pub enum NDArrayNumericTensorError {
    #[error("Requested dtype {0}, but had dtype {1}")]
    WrongDTypeError(DType, DType),
    #[error("Cannot reshape tensor from {0:?} to {1:?}")]
    InvalidReshapeError(Vec<usize>, Vec<usize>),
    #[error("Unsupported operation {0} for dtypes {1:?}")]
    UnsupportedOperationForDTypes(String, Vec<DType>),
    #[error("Raw data of {0} bytes does not hold {1} elements of {2}")]
    InvalidRawData(usize, usize, DType),
    #[error("Unsupported tensor data: {0}")]
    UnsupportedTensorData(String),
    #[error(transparent)]
    DTypeError(#[from] DTypeError),
    #[error(transparent)]
    NDArrayOperationError(#[from] ops::NDArrayOperationError),
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
}

/// Dynamically ranked tensor buffer. Cloning shares the underlying storage.
#[derive(Debug, Clone, PartialEq)]
pub enum NDArrayNumericTensor {
    F64(ArcArray<f64, IxDyn>),
    F32(ArcArray<f32, IxDyn>),
    I64(ArcArray<i64, IxDyn>),
    I32(ArcArray<i32, IxDyn>),
    I8(ArcArray<i8, IxDyn>),
    U8(ArcArray<u8, IxDyn>),
}

/// Apply a dtype-generic expression to the inner array, keeping the variant.
macro_rules! map_each_dtype {
    ($value:expr, $x:ident => $body:expr) => {
        match $value {
            NDArrayNumericTensor::F64($x) => NDArrayNumericTensor::F64($body),
            NDArrayNumericTensor::F32($x) => NDArrayNumericTensor::F32($body),
            NDArrayNumericTensor::I64($x) => NDArrayNumericTensor::I64($body),
            NDArrayNumericTensor::I32($x) => NDArrayNumericTensor::I32($body),
            NDArrayNumericTensor::I8($x) => NDArrayNumericTensor::I8($body),
            NDArrayNumericTensor::U8($x) => NDArrayNumericTensor::U8($body),
        }
    };
}

macro_rules! float_unary {
    ($value:expr, $name:expr, |$x:ident| $body:expr) => {
        Ok(match $value {
            NDArrayNumericTensor::F64(a) => NDArrayNumericTensor::F64(a.mapv(|$x: f64| $body).to_shared()),
            NDArrayNumericTensor::F32(a) => NDArrayNumericTensor::F32(a.mapv(|$x: f32| $body).to_shared()),
            other => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes($name.to_string(), vec![other.dtype()])),
        })
    };
}

macro_rules! arith_binary {
    ($a:expr, $b:expr, $name:expr, float |$x:ident, $y:ident| $fbody:expr, int |$xi:ident, $yi:ident| $ibody:expr) => {
        Ok(match ($a, $b) {
            (NDArrayNumericTensor::F64(a), NDArrayNumericTensor::F64(b)) => NDArrayNumericTensor::F64(ops::binary_map(a, b, |$x: &f64, $y: &f64| $fbody)?),
            (NDArrayNumericTensor::F32(a), NDArrayNumericTensor::F32(b)) => NDArrayNumericTensor::F32(ops::binary_map(a, b, |$x: &f32, $y: &f32| $fbody)?),
            (NDArrayNumericTensor::I64(a), NDArrayNumericTensor::I64(b)) => NDArrayNumericTensor::I64(ops::binary_map(a, b, |$xi: &i64, $yi: &i64| $ibody)?),
            (NDArrayNumericTensor::I32(a), NDArrayNumericTensor::I32(b)) => NDArrayNumericTensor::I32(ops::binary_map(a, b, |$xi: &i32, $yi: &i32| $ibody)?),
            (NDArrayNumericTensor::I8(a), NDArrayNumericTensor::I8(b)) => NDArrayNumericTensor::I8(ops::binary_map(a, b, |$xi: &i8, $yi: &i8| $ibody)?),
            (NDArrayNumericTensor::U8(a), NDArrayNumericTensor::U8(b)) => NDArrayNumericTensor::U8(ops::binary_map(a, b, |$xi: &u8, $yi: &u8| $ibody)?),
            (a, b) => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes($name.to_string(), vec![a.dtype(), b.dtype()])),
        })
    };
}

macro_rules! compare_binary {
    ($a:expr, $b:expr, $name:expr, |$x:ident, $y:ident| $body:expr) => {
        Ok(NDArrayNumericTensor::U8(match ($a, $b) {
            (NDArrayNumericTensor::F64(a), NDArrayNumericTensor::F64(b)) => ops::binary_map(a, b, |$x, $y| ($body) as u8)?,
            (NDArrayNumericTensor::F32(a), NDArrayNumericTensor::F32(b)) => ops::binary_map(a, b, |$x, $y| ($body) as u8)?,
            (NDArrayNumericTensor::I64(a), NDArrayNumericTensor::I64(b)) => ops::binary_map(a, b, |$x, $y| ($body) as u8)?,
            (NDArrayNumericTensor::I32(a), NDArrayNumericTensor::I32(b)) => ops::binary_map(a, b, |$x, $y| ($body) as u8)?,
            (NDArrayNumericTensor::I8(a), NDArrayNumericTensor::I8(b)) => ops::binary_map(a, b, |$x, $y| ($body) as u8)?,
            (NDArrayNumericTensor::U8(a), NDArrayNumericTensor::U8(b)) => ops::binary_map(a, b, |$x, $y| ($body) as u8)?,
            (a, b) => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes($name.to_string(), vec![a.dtype(), b.dtype()])),
        }))
    };
}

macro_rules! cast_array {
    ($x:expr, $dtype:expr) => {
        match $dtype {
            DType::F64 => NDArrayNumericTensor::F64($x.mapv(|v| -> f64 { v.as_() }).to_shared()),
            DType::F32 => NDArrayNumericTensor::F32($x.mapv(|v| -> f32 { v.as_() }).to_shared()),
            DType::I64 => NDArrayNumericTensor::I64($x.mapv(|v| -> i64 { v.as_() }).to_shared()),
            DType::I32 => NDArrayNumericTensor::I32($x.mapv(|v| -> i32 { v.as_() }).to_shared()),
            DType::I8 => NDArrayNumericTensor::I8($x.mapv(|v| -> i8 { v.as_() }).to_shared()),
            DType::U8 => NDArrayNumericTensor::U8($x.mapv(|v| -> u8 { v.as_() }).to_shared()),
        }
    };
}

/// Element count of `shape`, or an error when it does not fit in `usize`.
pub(crate) fn checked_num_elements(shape: &[usize]) -> Result<usize, NDArrayNumericTensorError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NDArrayNumericTensorError::UnsupportedTensorData(format!("shape {shape:?} has too many elements")))
}

impl NDArrayNumericTensor {
    pub fn dtype(&self) -> DType {
        match self {
            NDArrayNumericTensor::F64(_) => DType::F64,
            NDArrayNumericTensor::F32(_) => DType::F32,
            NDArrayNumericTensor::I64(_) => DType::I64,
            NDArrayNumericTensor::I32(_) => DType::I32,
            NDArrayNumericTensor::I8(_) => DType::I8,
            NDArrayNumericTensor::U8(_) => DType::U8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            NDArrayNumericTensor::F64(x) => x.shape(),
            NDArrayNumericTensor::F32(x) => x.shape(),
            NDArrayNumericTensor::I64(x) => x.shape(),
            NDArrayNumericTensor::I32(x) => x.shape(),
            NDArrayNumericTensor::I8(x) => x.shape(),
            NDArrayNumericTensor::U8(x) => x.shape(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            DType::F64 => NDArrayNumericTensor::F64(ArcArray::zeros(shape)),
            DType::F32 => NDArrayNumericTensor::F32(ArcArray::zeros(shape)),
            DType::I64 => NDArrayNumericTensor::I64(ArcArray::zeros(shape)),
            DType::I32 => NDArrayNumericTensor::I32(ArcArray::zeros(shape)),
            DType::I8 => NDArrayNumericTensor::I8(ArcArray::zeros(shape)),
            DType::U8 => NDArrayNumericTensor::U8(ArcArray::zeros(shape)),
        }
    }

    /// Rank-0 tensor holding `value` converted to `dtype`.
    pub fn scalar(dtype: DType, value: f64) -> Self {
        let shape = IxDyn(&[]);
        match dtype {
            DType::F64 => NDArrayNumericTensor::F64(ArcArray::from_elem(shape, value)),
            DType::F32 => NDArrayNumericTensor::F32(ArcArray::from_elem(shape, value as f32)),
            DType::I64 => NDArrayNumericTensor::I64(ArcArray::from_elem(shape, value as i64)),
            DType::I32 => NDArrayNumericTensor::I32(ArcArray::from_elem(shape, value as i32)),
            DType::I8 => NDArrayNumericTensor::I8(ArcArray::from_elem(shape, value as i8)),
            DType::U8 => NDArrayNumericTensor::U8(ArcArray::from_elem(shape, value as u8)),
        }
    }

    /// Random buffer of exactly `shape`: floats uniform in [-1, 1), integers
    /// small and signed, `U8` drawn as 0/1 so it stays a valid boolean.
    pub fn random<R: Rng>(dtype: DType, shape: &[usize], rng: &mut R) -> Result<Self, NDArrayNumericTensorError> {
        let n = checked_num_elements(shape)?;
        match dtype {
            DType::F64 => Self::from_vec_shape((0..n).map(|_| rng.gen_range(-1.0f64..1.0)).collect::<Vec<_>>(), shape),
            DType::F32 => Self::from_vec_shape((0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect::<Vec<_>>(), shape),
            DType::I64 => Self::from_vec_shape((0..n).map(|_| rng.gen_range(-10i64..10)).collect::<Vec<_>>(), shape),
            DType::I32 => Self::from_vec_shape((0..n).map(|_| rng.gen_range(-10i32..10)).collect::<Vec<_>>(), shape),
            DType::I8 => Self::from_vec_shape((0..n).map(|_| rng.gen_range(-10i8..10)).collect::<Vec<_>>(), shape),
            DType::U8 => Self::from_vec_shape((0..n).map(|_| rng.gen_range(0u8..=1)).collect::<Vec<_>>(), shape),
        }
    }

    pub fn from_raw_data(data: &[u8], dtype: DType, shape: Vec<usize>) -> Result<Self, NDArrayNumericTensorError> {
        let n = checked_num_elements(&shape)?;
        if n.checked_mul(dtype.size()) != Some(data.len()) {
            return Err(NDArrayNumericTensorError::InvalidRawData(data.len(), n, dtype));
        }
        Ok(match dtype {
            DType::F64 => {
                let data = data.chunks_exact(8).map(bytemuck::pod_read_unaligned::<f64>).collect();
                NDArrayNumericTensor::F64(ArcArray::from_shape_vec(IxDyn(&shape), data)?)
            }
            DType::F32 => {
                let data = data.chunks_exact(4).map(bytemuck::pod_read_unaligned::<f32>).collect();
                NDArrayNumericTensor::F32(ArcArray::from_shape_vec(IxDyn(&shape), data)?)
            }
            DType::I64 => {
                let data = data.chunks_exact(8).map(bytemuck::pod_read_unaligned::<i64>).collect();
                NDArrayNumericTensor::I64(ArcArray::from_shape_vec(IxDyn(&shape), data)?)
            }
            DType::I32 => {
                let data = data.chunks_exact(4).map(bytemuck::pod_read_unaligned::<i32>).collect();
                NDArrayNumericTensor::I32(ArcArray::from_shape_vec(IxDyn(&shape), data)?)
            }
            DType::I8 => {
                let data = bytemuck::cast_slice::<u8, i8>(data).to_vec();
                NDArrayNumericTensor::I8(ArcArray::from_shape_vec(IxDyn(&shape), data)?)
            }
            DType::U8 => NDArrayNumericTensor::U8(ArcArray::from_shape_vec(IxDyn(&shape), data.to_vec())?),
        })
    }

    /// Little-endian bytes in row-major order, as ONNX `raw_data` expects.
    pub fn to_raw_data(&self) -> Vec<u8> {
        match self {
            NDArrayNumericTensor::F64(x) => bytemuck::cast_slice(&x.iter().cloned().collect::<Vec<_>>()).to_vec(),
            NDArrayNumericTensor::F32(x) => bytemuck::cast_slice(&x.iter().cloned().collect::<Vec<_>>()).to_vec(),
            NDArrayNumericTensor::I64(x) => bytemuck::cast_slice(&x.iter().cloned().collect::<Vec<_>>()).to_vec(),
            NDArrayNumericTensor::I32(x) => bytemuck::cast_slice(&x.iter().cloned().collect::<Vec<_>>()).to_vec(),
            NDArrayNumericTensor::I8(x) => bytemuck::cast_slice(&x.iter().cloned().collect::<Vec<_>>()).to_vec(),
            NDArrayNumericTensor::U8(x) => x.iter().cloned().collect(),
        }
    }

    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        match self {
            NDArrayNumericTensor::F64(x) => cast_array!(x, dtype),
            NDArrayNumericTensor::F32(x) => cast_array!(x, dtype),
            NDArrayNumericTensor::I64(x) => cast_array!(x, dtype),
            NDArrayNumericTensor::I32(x) => cast_array!(x, dtype),
            NDArrayNumericTensor::I8(x) => cast_array!(x, dtype),
            NDArrayNumericTensor::U8(x) => cast_array!(x, dtype),
        }
    }

    /// Normalize to a 0/1 `U8` buffer (nonzero is true).
    pub fn to_bool(&self) -> Self {
        NDArrayNumericTensor::U8(match self {
            NDArrayNumericTensor::F64(x) => x.mapv(|v| !v.is_zero() as u8).to_shared(),
            NDArrayNumericTensor::F32(x) => x.mapv(|v| !v.is_zero() as u8).to_shared(),
            NDArrayNumericTensor::I64(x) => x.mapv(|v| !v.is_zero() as u8).to_shared(),
            NDArrayNumericTensor::I32(x) => x.mapv(|v| !v.is_zero() as u8).to_shared(),
            NDArrayNumericTensor::I8(x) => x.mapv(|v| !v.is_zero() as u8).to_shared(),
            NDArrayNumericTensor::U8(x) => x.mapv(|v| !v.is_zero() as u8).to_shared(),
        })
    }

    /// Integer view of a shape-like tensor (int64 or int32), flattened.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, NDArrayNumericTensorError> {
        match self {
            NDArrayNumericTensor::I64(x) => Ok(x.iter().cloned().collect()),
            NDArrayNumericTensor::I32(x) => Ok(x.iter().map(|&v| v as i64).collect()),
            other => Err(NDArrayNumericTensorError::WrongDTypeError(DType::I64, other.dtype())),
        }
    }

    pub fn add(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        arith_binary!(a, b, "add", float |x, y| *x + *y, int |x, y| x.wrapping_add(*y))
    }

    pub fn sub(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        arith_binary!(a, b, "sub", float |x, y| *x - *y, int |x, y| x.wrapping_sub(*y))
    }

    pub fn mul(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        arith_binary!(a, b, "mul", float |x, y| *x * *y, int |x, y| x.wrapping_mul(*y))
    }

    /// Integer division truncates; dividing an integer by zero yields 0.
    pub fn div(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        arith_binary!(a, b, "div", float |x, y| *x / *y, int |x, y| if *y == 0 { 0 } else { x.wrapping_div(*y) })
    }

    /// Float power. The exponent is converted to the base dtype first.
    pub fn pow(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        let b = b.cast(a.dtype());
        Ok(match (a, &b) {
            (NDArrayNumericTensor::F64(a), NDArrayNumericTensor::F64(b)) => NDArrayNumericTensor::F64(ops::binary_map(a, b, |x, y| x.powf(*y))?),
            (NDArrayNumericTensor::F32(a), NDArrayNumericTensor::F32(b)) => NDArrayNumericTensor::F32(ops::binary_map(a, b, |x, y| x.powf(*y))?),
            (a, b) => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("pow".to_string(), vec![a.dtype(), b.dtype()])),
        })
    }

    pub fn equal(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        compare_binary!(a, b, "equal", |x, y| x == y)
    }

    pub fn less(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        compare_binary!(a, b, "less", |x, y| x < y)
    }

    pub fn greater(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        compare_binary!(a, b, "greater", |x, y| x > y)
    }

    fn logical(a: &Self, b: &Self, name: &str, f: fn(bool, bool) -> bool) -> Result<Self, NDArrayNumericTensorError> {
        match (a, b) {
            (NDArrayNumericTensor::U8(a), NDArrayNumericTensor::U8(b)) =>
                Ok(NDArrayNumericTensor::U8(ops::binary_map(a, b, |x, y| f(*x != 0, *y != 0) as u8)?)),
            _ => Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes(name.to_string(), vec![a.dtype(), b.dtype()])),
        }
    }

    pub fn and(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        Self::logical(a, b, "and", |x, y| x && y)
    }

    pub fn or(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        Self::logical(a, b, "or", |x, y| x || y)
    }

    pub fn xor(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        Self::logical(a, b, "xor", |x, y| x ^ y)
    }

    pub fn not(&self) -> Result<Self, NDArrayNumericTensorError> {
        match self {
            NDArrayNumericTensor::U8(x) => Ok(NDArrayNumericTensor::U8(x.mapv(|v| (v == 0) as u8).to_shared())),
            _ => Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("not".to_string(), vec![self.dtype()])),
        }
    }

    pub fn relu(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "relu", |x| x.max(0.0))
    }

    pub fn leaky_relu(&self, alpha: f32) -> Result<Self, NDArrayNumericTensorError> {
        Ok(match self {
            NDArrayNumericTensor::F64(x) => NDArrayNumericTensor::F64(x.mapv(|v| if v >= 0.0 { v } else { v * alpha as f64 }).to_shared()),
            NDArrayNumericTensor::F32(x) => NDArrayNumericTensor::F32(x.mapv(|v| if v >= 0.0 { v } else { v * alpha }).to_shared()),
            _ => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("leaky_relu".to_string(), vec![self.dtype()])),
        })
    }

    pub fn sigmoid(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "sigmoid", |x| 1.0 / (1.0 + (-x).exp()))
    }

    pub fn tanh(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "tanh", |x| x.tanh())
    }

    pub fn exp(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "exp", |x| x.exp())
    }

    pub fn ln(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "ln", |x| x.ln())
    }

    pub fn sqrt(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "sqrt", |x| x.sqrt())
    }

    /// Tanh approximation of GELU.
    pub fn gelu(&self) -> Result<Self, NDArrayNumericTensorError> {
        float_unary!(self, "gelu", |x| 0.5 * x * (1.0 + (0.7978845608028654 * (x + 0.044715 * x * x * x)).tanh()))
    }

    pub fn neg(&self) -> Result<Self, NDArrayNumericTensorError> {
        Ok(match self {
            NDArrayNumericTensor::F64(x) => NDArrayNumericTensor::F64(x.mapv(|v| -v).to_shared()),
            NDArrayNumericTensor::F32(x) => NDArrayNumericTensor::F32(x.mapv(|v| -v).to_shared()),
            NDArrayNumericTensor::I64(x) => NDArrayNumericTensor::I64(x.mapv(|v| v.wrapping_neg()).to_shared()),
            NDArrayNumericTensor::I32(x) => NDArrayNumericTensor::I32(x.mapv(|v| v.wrapping_neg()).to_shared()),
            NDArrayNumericTensor::I8(x) => NDArrayNumericTensor::I8(x.mapv(|v| v.wrapping_neg()).to_shared()),
            NDArrayNumericTensor::U8(_) => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("neg".to_string(), vec![self.dtype()])),
        })
    }

    pub fn abs(&self) -> Self {
        match self {
            NDArrayNumericTensor::F64(x) => NDArrayNumericTensor::F64(x.mapv(|v| v.abs()).to_shared()),
            NDArrayNumericTensor::F32(x) => NDArrayNumericTensor::F32(x.mapv(|v| v.abs()).to_shared()),
            NDArrayNumericTensor::I64(x) => NDArrayNumericTensor::I64(x.mapv(|v| v.wrapping_abs()).to_shared()),
            NDArrayNumericTensor::I32(x) => NDArrayNumericTensor::I32(x.mapv(|v| v.wrapping_abs()).to_shared()),
            NDArrayNumericTensor::I8(x) => NDArrayNumericTensor::I8(x.mapv(|v| v.wrapping_abs()).to_shared()),
            NDArrayNumericTensor::U8(x) => NDArrayNumericTensor::U8(x.clone()),
        }
    }

    /// Opset-11 softmax: the input is coerced to 2-D at `axis` and each row
    /// is normalized independently.
    pub fn softmax(&self, axis: i64) -> Result<Self, NDArrayNumericTensorError> {
        let shape = self.shape().to_vec();
        let axis = if axis < 0 { axis + shape.len() as i64 } else { axis };
        if axis < 0 || axis > shape.len() as i64 {
            return Err(ops::NDArrayOperationError::OutOfBounds.into());
        }
        let outer: usize = shape[..axis as usize].iter().product();
        let inner: usize = shape[axis as usize..].iter().product();
        let flat = self.reshape(&[outer, inner])?;
        let out = match &flat {
            NDArrayNumericTensor::F64(x) => NDArrayNumericTensor::F64(ops::softmax_lanes(x, 1)),
            NDArrayNumericTensor::F32(x) => NDArrayNumericTensor::F32(ops::softmax_lanes(x, 1)),
            _ => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("softmax".to_string(), vec![self.dtype()])),
        };
        out.reshape(&shape)
    }

    pub fn matmul(a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        Ok(match (a, b) {
            (NDArrayNumericTensor::F64(a), NDArrayNumericTensor::F64(b)) => NDArrayNumericTensor::F64(ops::matmul(a, b)?),
            (NDArrayNumericTensor::F32(a), NDArrayNumericTensor::F32(b)) => NDArrayNumericTensor::F32(ops::matmul(a, b)?),
            (NDArrayNumericTensor::I64(a), NDArrayNumericTensor::I64(b)) => NDArrayNumericTensor::I64(ops::matmul(a, b)?),
            (NDArrayNumericTensor::I32(a), NDArrayNumericTensor::I32(b)) => NDArrayNumericTensor::I32(ops::matmul(a, b)?),
            _ => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("matmul".to_string(), vec![a.dtype(), b.dtype()])),
        })
    }

    /// `alpha * op(a) @ op(b) + beta * c`, with `c` broadcast to the product.
    pub fn gemm(a: &Self, b: &Self, c: Option<&Self>, alpha: f32, beta: f32, trans_a: bool, trans_b: bool) -> Result<Self, NDArrayNumericTensorError> {
        if a.rank() != 2 || b.rank() != 2 {
            return Err(ops::NDArrayOperationError::IncompatibleShapes(format!("gemm {:?} x {:?}", a.shape(), b.shape())).into());
        }
        let a = if trans_a { a.transpose(None)? } else { a.clone() };
        let b = if trans_b { b.transpose(None)? } else { b.clone() };
        let mut y = Self::matmul(&a, &b)?;
        if alpha != 1.0 {
            y = Self::mul(&y, &Self::scalar(y.dtype(), alpha as f64))?;
        }
        if let Some(c) = c {
            let c = if beta != 1.0 { Self::mul(c, &Self::scalar(c.dtype(), beta as f64))? } else { c.clone() };
            y = Self::add(&y, &c)?;
        }
        Ok(y)
    }

    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self, NDArrayNumericTensorError> {
        if new_shape.iter().product::<usize>() != self.num_elements() {
            return Err(NDArrayNumericTensorError::InvalidReshapeError(self.shape().to_vec(), new_shape.to_vec()));
        }
        Ok(map_each_dtype!(self, x => ops::reshape(x, new_shape)?))
    }

    /// ONNX Flatten: collapse to `[prod(dims[..axis]), prod(dims[axis..])]`.
    pub fn flatten(&self, axis: i64) -> Result<Self, NDArrayNumericTensorError> {
        let rank = self.rank() as i64;
        let axis = if axis < 0 { axis + rank } else { axis };
        if axis < 0 || axis > rank {
            return Err(ops::NDArrayOperationError::OutOfBounds.into());
        }
        let outer: usize = self.shape()[..axis as usize].iter().product();
        let inner: usize = self.shape()[axis as usize..].iter().product();
        self.reshape(&[outer, inner])
    }

    /// Remove the listed unit axes, or every unit axis when `axes` is `None`.
    pub fn squeeze(&self, axes: Option<&[i64]>) -> Result<Self, NDArrayNumericTensorError> {
        let shape = self.shape();
        let remove: Vec<usize> = match axes {
            Some(axes) => {
                let axes = axes.iter().map(|&a| ops::normalize_axis(a, shape.len())).collect::<Result<Vec<_>, _>>()?;
                if axes.iter().any(|&a| shape[a] != 1) {
                    return Err(ops::NDArrayOperationError::IncompatibleShapes(format!("squeeze {axes:?} of {shape:?}")).into());
                }
                axes
            }
            None => (0..shape.len()).filter(|&a| shape[a] == 1).collect(),
        };
        let new_shape: Vec<usize> = shape.iter().enumerate()
            .filter(|(i, _)| !remove.contains(i))
            .map(|(_, &d)| d)
            .collect();
        self.reshape(&new_shape)
    }

    /// Insert unit axes; `axes` index into the output shape.
    pub fn unsqueeze(&self, axes: &[i64]) -> Result<Self, NDArrayNumericTensorError> {
        let out_rank = self.rank() + axes.len();
        let mut axes = axes.iter().map(|&a| ops::normalize_axis(a, out_rank)).collect::<Result<Vec<_>, _>>()?;
        axes.sort_unstable();
        axes.dedup();
        if axes.len() + self.rank() != out_rank {
            return Err(ops::NDArrayOperationError::IncompatibleShapes("duplicate unsqueeze axes".to_string()).into());
        }
        let mut input_dims = self.shape().iter();
        let new_shape: Vec<usize> = (0..out_rank)
            .map(|i| if axes.contains(&i) { 1 } else { input_dims.next().copied().unwrap_or(1) })
            .collect();
        self.reshape(&new_shape)
    }

    pub fn transpose(&self, perm: Option<&[i64]>) -> Result<Self, NDArrayNumericTensorError> {
        Ok(map_each_dtype!(self, x => ops::transpose(x, perm)?))
    }

    pub fn expand(&self, shape: &[usize]) -> Result<Self, NDArrayNumericTensorError> {
        Ok(map_each_dtype!(self, x => ops::expand(x, shape)?))
    }

    pub fn concat(tensors: &[&Self], axis: i64) -> Result<Self, NDArrayNumericTensorError> {
        let first = tensors.first().ok_or(ops::NDArrayOperationError::OutOfBounds)?;
        let axis = ops::normalize_axis(axis, first.rank())?;
        macro_rules! concat_variant {
            ($variant:ident) => {{
                let mut arrays = Vec::with_capacity(tensors.len());
                for t in tensors {
                    if let NDArrayNumericTensor::$variant(x) = t {
                        arrays.push(x);
                    } else {
                        return Err(NDArrayNumericTensorError::WrongDTypeError(first.dtype(), t.dtype()));
                    }
                }
                NDArrayNumericTensor::$variant(ops::concat(axis, &arrays)?)
            }};
        }
        Ok(match first {
            NDArrayNumericTensor::F64(_) => concat_variant!(F64),
            NDArrayNumericTensor::F32(_) => concat_variant!(F32),
            NDArrayNumericTensor::I64(_) => concat_variant!(I64),
            NDArrayNumericTensor::I32(_) => concat_variant!(I32),
            NDArrayNumericTensor::I8(_) => concat_variant!(I8),
            NDArrayNumericTensor::U8(_) => concat_variant!(U8),
        })
    }

    pub fn gather(data: &Self, indices: &Self, axis: i64) -> Result<Self, NDArrayNumericTensorError> {
        let axis = ops::normalize_axis(axis, data.rank())?;
        let indices = match indices {
            NDArrayNumericTensor::I64(x) => x.clone(),
            NDArrayNumericTensor::I32(x) => x.mapv(|v| v as i64).to_shared(),
            other => return Err(NDArrayNumericTensorError::WrongDTypeError(DType::I64, other.dtype())),
        };
        Ok(map_each_dtype!(data, x => ops::gather(axis, x, &indices)?))
    }

    /// ONNX Slice with optional `axes` (default: leading axes) and `steps`
    /// (default: 1).
    pub fn slice(&self, starts: &[i64], ends: &[i64], axes: Option<&[i64]>, steps: Option<&[i64]>) -> Result<Self, NDArrayNumericTensorError> {
        let rank = self.rank();
        if starts.len() != ends.len() {
            return Err(ops::NDArrayOperationError::IncompatibleShapes("slice starts and ends differ in length".to_string()).into());
        }
        let axes: Vec<usize> = match axes {
            Some(axes) => axes.iter().map(|&a| ops::normalize_axis(a, rank)).collect::<Result<_, _>>()?,
            None => (0..starts.len()).collect(),
        };
        if axes.len() != starts.len() || steps.is_some_and(|s| s.len() != starts.len()) {
            return Err(ops::NDArrayOperationError::IncompatibleShapes("slice parameter lengths differ".to_string()).into());
        }
        let mut slices = vec![None; rank];
        for (i, &axis) in axes.iter().enumerate() {
            let step = steps.map(|s| s[i]).unwrap_or(1);
            slices[axis] = Some(ops::onnx_slice_spec(self.shape()[axis], starts[i], ends[i], step)?);
        }
        Ok(map_each_dtype!(self, x => ops::slice_axes(x, &slices)))
    }

    /// `self` is the condition; any dtype is read as nonzero-is-true.
    pub fn where_op(&self, a: &Self, b: &Self) -> Result<Self, NDArrayNumericTensorError> {
        let cond = self.to_bool();
        let cond = cond.as_inner::<u8>()?;
        Ok(match (a, b) {
            (NDArrayNumericTensor::F64(a), NDArrayNumericTensor::F64(b)) => NDArrayNumericTensor::F64(ops::where_select(cond, a, b)?),
            (NDArrayNumericTensor::F32(a), NDArrayNumericTensor::F32(b)) => NDArrayNumericTensor::F32(ops::where_select(cond, a, b)?),
            (NDArrayNumericTensor::I64(a), NDArrayNumericTensor::I64(b)) => NDArrayNumericTensor::I64(ops::where_select(cond, a, b)?),
            (NDArrayNumericTensor::I32(a), NDArrayNumericTensor::I32(b)) => NDArrayNumericTensor::I32(ops::where_select(cond, a, b)?),
            (NDArrayNumericTensor::I8(a), NDArrayNumericTensor::I8(b)) => NDArrayNumericTensor::I8(ops::where_select(cond, a, b)?),
            (NDArrayNumericTensor::U8(a), NDArrayNumericTensor::U8(b)) => NDArrayNumericTensor::U8(ops::where_select(cond, a, b)?),
            (a, b) => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("where".to_string(), vec![self.dtype(), a.dtype(), b.dtype()])),
        })
    }

    fn reduce_axes(&self, axes: Option<&[i64]>) -> Result<Vec<usize>, NDArrayNumericTensorError> {
        Ok(match axes {
            Some(axes) => axes.iter().map(|&a| ops::normalize_axis(a, self.rank())).collect::<Result<_, _>>()?,
            None => (0..self.rank()).collect(),
        })
    }

    /// Sum over `axes`, or over every axis when `None`.
    pub fn reduce_sum(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Self, NDArrayNumericTensorError> {
        let axes = self.reduce_axes(axes)?;
        Ok(map_each_dtype!(self, x => ops::reduce_sum(x, &axes, keepdims)))
    }

    pub fn reduce_mean(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Self, NDArrayNumericTensorError> {
        let mut axes_idx = self.reduce_axes(axes)?;
        axes_idx.sort_unstable();
        axes_idx.dedup();
        let count: usize = axes_idx.iter().map(|&a| self.shape()[a]).product();
        let sum = self.reduce_sum(axes, keepdims)?;
        Self::div(&sum, &Self::scalar(self.dtype(), count as f64))
    }

    pub(crate) fn conv2d(&self, weight: &Self, bias: Option<&Self>, window: &Window2d, group: usize) -> Result<Self, NDArrayNumericTensorError> {
        Ok(match (self, weight, bias) {
            (NDArrayNumericTensor::F64(x), NDArrayNumericTensor::F64(w), None) => NDArrayNumericTensor::F64(ops::conv2d(x, w, None, window, group)?),
            (NDArrayNumericTensor::F64(x), NDArrayNumericTensor::F64(w), Some(NDArrayNumericTensor::F64(b))) => NDArrayNumericTensor::F64(ops::conv2d(x, w, Some(b), window, group)?),
            (NDArrayNumericTensor::F32(x), NDArrayNumericTensor::F32(w), None) => NDArrayNumericTensor::F32(ops::conv2d(x, w, None, window, group)?),
            (NDArrayNumericTensor::F32(x), NDArrayNumericTensor::F32(w), Some(NDArrayNumericTensor::F32(b))) => NDArrayNumericTensor::F32(ops::conv2d(x, w, Some(b), window, group)?),
            _ => {
                let mut dtypes = vec![self.dtype(), weight.dtype()];
                dtypes.extend(bias.map(|b| b.dtype()));
                return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("conv".to_string(), dtypes));
            }
        })
    }

    pub(crate) fn max_pool2d(&self, window: &Window2d) -> Result<Self, NDArrayNumericTensorError> {
        Ok(match self {
            NDArrayNumericTensor::F64(x) => NDArrayNumericTensor::F64(ops::max_pool2d(x, window)?),
            NDArrayNumericTensor::F32(x) => NDArrayNumericTensor::F32(ops::max_pool2d(x, window)?),
            _ => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("max_pool".to_string(), vec![self.dtype()])),
        })
    }

    pub fn batch_norm(&self, scale: &Self, bias: &Self, mean: &Self, var: &Self, epsilon: f32) -> Result<Self, NDArrayNumericTensorError> {
        Ok(match self {
            NDArrayNumericTensor::F64(x) => NDArrayNumericTensor::F64(ops::batch_norm(
                x,
                &scale.try_to_vec::<f64>()?,
                &bias.try_to_vec::<f64>()?,
                &mean.try_to_vec::<f64>()?,
                &var.try_to_vec::<f64>()?,
                epsilon as f64,
            )?),
            NDArrayNumericTensor::F32(x) => NDArrayNumericTensor::F32(ops::batch_norm(
                x,
                &scale.try_to_vec::<f32>()?,
                &bias.try_to_vec::<f32>()?,
                &mean.try_to_vec::<f32>()?,
                &var.try_to_vec::<f32>()?,
                epsilon,
            )?),
            _ => return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("batch_norm".to_string(), vec![self.dtype()])),
        })
    }

    /// Training-mode dropout. Returns the scaled output and the 0/1 keep mask.
    pub fn dropout<R: Rng>(&self, ratio: f32, rng: &mut R) -> Result<(Self, Self), NDArrayNumericTensorError> {
        // The 1 / (1 - ratio) rescale has no integer form
        if !matches!(self, NDArrayNumericTensor::F64(_) | NDArrayNumericTensor::F32(_)) {
            return Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes("dropout".to_string(), vec![self.dtype()]));
        }
        let keep: Vec<u8> = (0..self.num_elements()).map(|_| rng.gen_bool(1.0 - ratio as f64) as u8).collect();
        let mask = Self::from_vec_shape(keep, self.shape())?;
        let scale = if ratio < 1.0 { 1.0 / (1.0 - ratio as f64) } else { 0.0 };
        let kept = Self::mul(self, &mask.cast(self.dtype()))?;
        let out = Self::mul(&kept, &Self::scalar(self.dtype(), scale))?;
        Ok((out, mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_mean_ignores_repeated_axes() {
        let a = NDArrayNumericTensor::from_vec_shape(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let out = a.reduce_mean(Some(&[1, -1][..]), false).unwrap();
        assert_eq!(out.try_to_vec::<f32>().unwrap(), vec![2.0, 5.0]);
        let out = a.reduce_mean(Some(&[0, 1, 0][..]), false).unwrap();
        assert_eq!(out.try_to_vec::<f32>().unwrap(), vec![3.5]);
    }

    #[test]
    fn training_dropout_rejects_integers() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let ints = NDArrayNumericTensor::from_vec(vec![4i64, 8, 12]);
        assert!(matches!(
            ints.dropout(0.5, &mut rng),
            Err(NDArrayNumericTensorError::UnsupportedOperationForDTypes(..))
        ));
        let floats = NDArrayNumericTensor::from_vec(vec![1.0f32; 8]);
        let (out, mask) = floats.dropout(0.5, &mut rng).unwrap();
        let mask = mask.try_to_vec::<u8>().unwrap();
        for (v, m) in out.try_to_vec::<f32>().unwrap().into_iter().zip(mask) {
            assert_eq!(v, if m == 1 { 2.0 } else { 0.0 });
        }
    }

    #[test]
    fn integer_division_by_zero_yields_zero() {
        let a = NDArrayNumericTensor::from_vec(vec![7i64, -9, 4]);
        let b = NDArrayNumericTensor::from_vec(vec![2i64, 0, -4]);
        let out = NDArrayNumericTensor::div(&a, &b).unwrap();
        assert_eq!(out.try_to_vec::<i64>().unwrap(), vec![3, 0, -1]);
    }

    #[test]
    fn comparisons_produce_zero_one_bytes() {
        let a = NDArrayNumericTensor::from_vec(vec![1.0f32, 2.0, 3.0]);
        let b = NDArrayNumericTensor::from_vec_shape(vec![2.0f32], &[]).unwrap();
        let out = NDArrayNumericTensor::less(&a, &b).unwrap();
        assert_eq!(out.dtype(), DType::U8);
        assert_eq!(out.try_to_vec::<u8>().unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn softmax_coerces_to_two_dimensions() {
        let a = NDArrayNumericTensor::from_vec_shape(vec![0.0f32; 6], &[1, 2, 3]).unwrap();
        let out = a.softmax(1).unwrap();
        assert_eq!(out.shape(), &[1, 2, 3]);
        for v in out.try_to_vec::<f32>().unwrap() {
            assert!((v - 1.0 / 6.0).abs() < 1e-6);
        }
    }

    #[test]
    fn raw_data_round_trips_every_dtype() {
        for dtype in [DType::F64, DType::F32, DType::I64, DType::I32, DType::I8, DType::U8] {
            let mut rng = rand::thread_rng();
            let tensor = NDArrayNumericTensor::random(dtype, &[2, 3], &mut rng).unwrap();
            let raw = tensor.to_raw_data();
            assert_eq!(raw.len(), 6 * dtype.size());
            assert_eq!(NDArrayNumericTensor::from_raw_data(&raw, dtype, vec![2, 3]).unwrap(), tensor);
        }
    }

    #[test]
    fn unsqueeze_then_squeeze_restores_shape() {
        let a = NDArrayNumericTensor::from_vec_shape(vec![1i32, 2, 3, 4], &[2, 2]).unwrap();
        let b = a.unsqueeze(&[0, -1]).unwrap();
        assert_eq!(b.shape(), &[1, 2, 2, 1]);
        assert_eq!(b.squeeze(None).unwrap(), a);
    }
}
