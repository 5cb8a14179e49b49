pub mod numeric_tensor;
pub mod ops;
pub mod conversions;

pub use numeric_tensor::{NDArrayNumericTensor, NDArrayNumericTensorError};