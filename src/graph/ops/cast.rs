use crate::dtype::DType;
use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_int, query_attribute_int};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

/// Element type conversion. `to_bool` marks a cast to ONNX `BOOL`, which
/// natively normalizes to a 0/1 `U8` buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct CastOperation {
    input: TensorId,
    output: TensorId,
    to: DType,
    to_bool: bool,
}

impl CastOperation {
    pub fn new(input: TensorId, output: TensorId, to: DType) -> Self {
        Self { input, output, to, to_bool: false }
    }

    pub fn new_to_bool(input: TensorId, output: TensorId) -> Self {
        Self { input, output, to: DType::U8, to_bool: true }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        let to = node.require_attribute(query_attribute_int(node.attributes(), "to"), "to")? as i32;
        let input = node.input(0)?;
        let output = node.output(0)?;
        if to == onnx::tensor_proto::DataType::Bool as i32 {
            Ok(Self::new_to_bool(input, output))
        } else {
            Ok(Self::new(input, output, DType::from_onnx_tag(to)?))
        }
    }
}

impl Operation for CastOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Cast
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let out = if self.to_bool {
            inputs[0].to_bool()
        } else {
            inputs[0].cast(self.to)
        };
        Ok(vec![out])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        let to = if self.to_bool {
            onnx::tensor_proto::DataType::Bool
        } else {
            onnx::tensor_proto::DataType::from(self.to)
        };
        vec![make_attribute_int("to", to as i64)]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Any]
    }

    fn get_onnx_bool_outputs(&self) -> Vec<bool> {
        vec![self.to_bool]
    }
}
