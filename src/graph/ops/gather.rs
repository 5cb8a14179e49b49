use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_int, query_attribute_int};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Clone, Debug, PartialEq)]
pub struct GatherOperation {
    data: TensorId,
    indices: TensorId,
    output: TensorId,
    axis: i64,
}

impl GatherOperation {
    pub fn new(data: TensorId, indices: TensorId, output: TensorId, axis: i64) -> Self {
        Self { data, indices, output, axis }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 2 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Gather".to_string()));
        }
        Ok(Self {
            data: node.input(0)?,
            indices: node.input(1)?,
            output: node.output(0)?,
            axis: query_attribute_int(node.attributes(), "axis").unwrap_or(0),
        })
    }
}

impl Operation for GatherOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Gather
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.data, self.indices]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![NDArrayNumericTensor::gather(inputs[0], inputs[1], self.axis)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_int("axis", self.axis)]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough, OnnxSlot::Numeric]
    }
}
