mod binary;
mod cast;
mod concat;
mod conv;
mod gather;
mod misc;
mod normalization;
mod reduce;
mod reshape;
mod slice;
mod transpose;
mod unary;

pub use binary::{BinaryOperation, GemmOperation, WhichBinaryOperation};
pub use cast::CastOperation;
pub use concat::ConcatOperation;
pub use conv::{ConvDescriptor, ConvOperation, MaxPoolOperation};
pub use gather::GatherOperation;
pub use misc::{ExpandOperation, WhereOperation};
pub use normalization::BatchNormalizationOperation;
pub use reduce::{ReduceOperation, WhichReduceOperation};
pub use reshape::{FlattenOperation, ReshapeOperation, SqueezeOperation, UnsqueezeOperation};
pub use slice::SliceOperation;
pub use transpose::TransposeOperation;
pub use unary::{
    DropoutOperation, LeakyReluOperation, SoftmaxOperation, UnaryOperation, WhichUnaryOperation,
};

use crate::eval_backend::EvalContext;
use crate::graph::registry::OpKind;
use crate::graph::{Graph, TensorId, TensorRole};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::{NDArrayNumericTensor, NDArrayNumericTensorError};
use crate::onnx;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    NDArrayNumericTensorError(#[from] NDArrayNumericTensorError),
    #[error("Operator {op} does not accept the empty tensor \"{tensor}\"")]
    IllegalEmptyTensor { op: String, tensor: String },
    #[error("Operator {op} reads \"{tensor}\", which has no value yet")]
    MissingDependency { op: String, tensor: String },
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("Invalid input for operation {0}")]
    InvalidInput(String),
    #[error("Tensor name \"{0}\" is already taken")]
    NameConflict(String),
    #[error("Unknown tensor {0}")]
    UnknownTensor(String),
}

/// How an input position is typed on the ONNX side, which decides where
/// the exporter inserts boolean casts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OnnxSlot {
    /// Numeric tensor; a `BOOL` producer gets a `Cast(to=UINT8)`.
    Numeric,
    /// `BOOL` tensor; anything else gets a `Cast(to=BOOL)`.
    Bool,
    /// Type-preserving; all such slots of one node must agree.
    Passthrough,
    /// Accepts either (e.g. the input of `Cast`).
    Any,
}

pub trait Operation {
    fn get_op_kind(&self) -> OpKind;
    /// Present inputs, in ONNX input order. Absent optional inputs are skipped.
    fn get_inputs(&self) -> Vec<TensorId>;
    fn get_outputs(&self) -> Vec<TensorId>;
    /// `inputs` line up with `get_inputs()`; the result lines up with `get_outputs()`.
    fn eval(&self, ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError>;

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![]
    }
    /// int64 payloads ONNX models as trailing tensor inputs (shapes, slice bounds).
    fn get_onnx_constant_inputs(&self) -> Vec<Vec<i64>> {
        vec![]
    }
    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Numeric; self.get_inputs().len()]
    }
    fn get_onnx_bool_outputs(&self) -> Vec<bool> {
        vec![self.get_op_kind().produces_bool(); self.get_outputs().len()]
    }
}

/// One ONNX node during import, with its names already resolved to ids.
pub(crate) struct OnnxNode<'a> {
    pub proto: &'a onnx::NodeProto,
    pub inputs: Vec<Option<TensorId>>,
    pub outputs: Vec<Option<TensorId>>,
    pub graph: &'a Graph,
}

impl OnnxNode<'_> {
    pub fn attributes(&self) -> &[onnx::AttributeProto] {
        &self.proto.attribute
    }

    pub fn optional_input(&self, index: usize) -> Option<TensorId> {
        self.inputs.get(index).copied().flatten()
    }

    pub fn input(&self, index: usize) -> Result<TensorId, ONNXDecodingError> {
        self.optional_input(index)
            .ok_or_else(|| ONNXDecodingError::InvalidOperatorInputs(self.proto.op_type.clone()))
    }

    pub fn optional_output(&self, index: usize) -> Option<TensorId> {
        self.outputs.get(index).copied().flatten()
    }

    pub fn output(&self, index: usize) -> Result<TensorId, ONNXDecodingError> {
        self.optional_output(index)
            .ok_or_else(|| ONNXDecodingError::InvalidOperatorOutputs(self.proto.op_type.clone()))
    }

    /// Fold an int64 tensor input into a plain vector. Absent optional
    /// inputs fold to `None`.
    pub fn fold_ints(&self, index: usize) -> Result<Option<Vec<i64>>, ONNXDecodingError> {
        let Some(id) = self.optional_input(index) else {
            return Ok(None);
        };
        let info = self.graph.get_tensor_info(id).ok_or_else(|| ONNXDecodingError::MissingDependency {
            node: self.proto.name.clone(),
            tensor: self.graph.tensor_display_name(id),
        })?;
        // Only fixed data can become an attribute; anything a replay may change cannot
        let fixed = match info.role {
            TensorRole::Constant => true,
            TensorRole::Weight => !info.trainable,
            _ => false,
        };
        if !fixed {
            return Err(ONNXDecodingError::InvalidOperatorInputs(format!(
                "{}: input \"{}\" must be a constant",
                self.proto.op_type,
                self.graph.tensor_display_name(id)
            )));
        }
        let value = info.value.as_ref().ok_or_else(|| ONNXDecodingError::MissingDependency {
            node: self.proto.name.clone(),
            tensor: self.graph.tensor_display_name(id),
        })?;
        Ok(Some(value.to_i64_vec()?))
    }

    pub fn require_attribute<T>(&self, value: Option<T>, name: &str) -> Result<T, ONNXDecodingError> {
        value.ok_or_else(|| ONNXDecodingError::MissingAttribute(self.proto.op_type.clone(), name.to_string()))
    }
}

#[derive(Clone, Debug, strum_macros::VariantNames)]
pub enum AnyOperation {
    Binary(BinaryOperation),
    Gemm(GemmOperation),
    Unary(UnaryOperation),
    LeakyRelu(LeakyReluOperation),
    Softmax(SoftmaxOperation),
    Dropout(DropoutOperation),
    Reshape(ReshapeOperation),
    Flatten(FlattenOperation),
    Squeeze(SqueezeOperation),
    Unsqueeze(UnsqueezeOperation),
    Transpose(TransposeOperation),
    Expand(ExpandOperation),
    Concat(ConcatOperation),
    Gather(GatherOperation),
    Slice(SliceOperation),
    Cast(CastOperation),
    Where(WhereOperation),
    Reduce(ReduceOperation),
    Conv(ConvOperation),
    MaxPool(MaxPoolOperation),
    BatchNormalization(BatchNormalizationOperation),
}

macro_rules! delegate {
    ($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        fn $name(&self, $($arg: $ty),*) -> $ret {
            match self {
                AnyOperation::Binary(x) => x.$name($($arg),*),
                AnyOperation::Gemm(x) => x.$name($($arg),*),
                AnyOperation::Unary(x) => x.$name($($arg),*),
                AnyOperation::LeakyRelu(x) => x.$name($($arg),*),
                AnyOperation::Softmax(x) => x.$name($($arg),*),
                AnyOperation::Dropout(x) => x.$name($($arg),*),
                AnyOperation::Reshape(x) => x.$name($($arg),*),
                AnyOperation::Flatten(x) => x.$name($($arg),*),
                AnyOperation::Squeeze(x) => x.$name($($arg),*),
                AnyOperation::Unsqueeze(x) => x.$name($($arg),*),
                AnyOperation::Transpose(x) => x.$name($($arg),*),
                AnyOperation::Expand(x) => x.$name($($arg),*),
                AnyOperation::Concat(x) => x.$name($($arg),*),
                AnyOperation::Gather(x) => x.$name($($arg),*),
                AnyOperation::Slice(x) => x.$name($($arg),*),
                AnyOperation::Cast(x) => x.$name($($arg),*),
                AnyOperation::Where(x) => x.$name($($arg),*),
                AnyOperation::Reduce(x) => x.$name($($arg),*),
                AnyOperation::Conv(x) => x.$name($($arg),*),
                AnyOperation::MaxPool(x) => x.$name($($arg),*),
                AnyOperation::BatchNormalization(x) => x.$name($($arg),*),
            }
        }
    }
}

impl Operation for AnyOperation {
    delegate!(get_op_kind() -> OpKind);
    delegate!(get_inputs() -> Vec<TensorId>);
    delegate!(get_outputs() -> Vec<TensorId>);
    delegate!(eval(ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError>);
    delegate!(get_onnx_attributes() -> Vec<onnx::AttributeProto>);
    delegate!(get_onnx_constant_inputs() -> Vec<Vec<i64>>);
    delegate!(get_onnx_input_slots() -> Vec<OnnxSlot>);
    delegate!(get_onnx_bool_outputs() -> Vec<bool>);
}

impl AnyOperation {
    pub(crate) fn from_onnx(kind: OpKind, node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        Ok(match kind {
            OpKind::Add => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Add)?),
            OpKind::Sub => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Sub)?),
            OpKind::Mul => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Mul)?),
            OpKind::Div => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Div)?),
            OpKind::Pow => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Pow)?),
            OpKind::MatMul => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::MatMul)?),
            OpKind::Equal => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Equal)?),
            OpKind::Less => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Less)?),
            OpKind::Greater => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Greater)?),
            OpKind::And => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::And)?),
            OpKind::Or => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Or)?),
            OpKind::Xor => AnyOperation::Binary(BinaryOperation::from_onnx(node, WhichBinaryOperation::Xor)?),
            OpKind::Gemm => AnyOperation::Gemm(GemmOperation::from_onnx(node)?),
            OpKind::Relu => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Relu)?),
            OpKind::Sigmoid => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Sigmoid)?),
            OpKind::Tanh => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Tanh)?),
            OpKind::Exp => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Exp)?),
            OpKind::Log => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Log)?),
            OpKind::Sqrt => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Sqrt)?),
            OpKind::Neg => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Neg)?),
            OpKind::Abs => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Abs)?),
            OpKind::Not => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Not)?),
            OpKind::Identity => AnyOperation::Unary(UnaryOperation::from_onnx(node, WhichUnaryOperation::Identity)?),
            OpKind::LeakyRelu => AnyOperation::LeakyRelu(LeakyReluOperation::from_onnx(node)?),
            OpKind::Softmax => AnyOperation::Softmax(SoftmaxOperation::from_onnx(node)?),
            OpKind::Dropout => AnyOperation::Dropout(DropoutOperation::from_onnx(node)?),
            OpKind::Reshape => AnyOperation::Reshape(ReshapeOperation::from_onnx(node)?),
            OpKind::Flatten => AnyOperation::Flatten(FlattenOperation::from_onnx(node)?),
            OpKind::Squeeze => AnyOperation::Squeeze(SqueezeOperation::from_onnx(node)?),
            OpKind::Unsqueeze => AnyOperation::Unsqueeze(UnsqueezeOperation::from_onnx(node)?),
            OpKind::Transpose => AnyOperation::Transpose(TransposeOperation::from_onnx(node)?),
            OpKind::Expand => AnyOperation::Expand(ExpandOperation::from_onnx(node)?),
            OpKind::Concat => AnyOperation::Concat(ConcatOperation::from_onnx(node)?),
            OpKind::Gather => AnyOperation::Gather(GatherOperation::from_onnx(node)?),
            OpKind::Slice => AnyOperation::Slice(SliceOperation::from_onnx(node)?),
            OpKind::Cast => AnyOperation::Cast(CastOperation::from_onnx(node)?),
            OpKind::Where => AnyOperation::Where(WhereOperation::from_onnx(node)?),
            OpKind::ReduceSum => AnyOperation::Reduce(ReduceOperation::from_onnx(node, WhichReduceOperation::ReduceSum)?),
            OpKind::ReduceMean => AnyOperation::Reduce(ReduceOperation::from_onnx(node, WhichReduceOperation::ReduceMean)?),
            OpKind::Conv => AnyOperation::Conv(ConvOperation::from_onnx(node)?),
            OpKind::MaxPool => AnyOperation::MaxPool(MaxPoolOperation::from_onnx(node)?),
            OpKind::BatchNormalization => AnyOperation::BatchNormalization(BatchNormalizationOperation::from_onnx(node)?),
            // Constant nodes become tensors, and Gelu has no opset-11 form
            OpKind::Constant | OpKind::Gelu => return Err(ONNXDecodingError::UnsupportedOperator(kind.to_string())),
        })
    }
}
