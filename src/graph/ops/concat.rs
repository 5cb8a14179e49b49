use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_int, query_attribute_int};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Clone, Debug, PartialEq)]
pub struct ConcatOperation {
    inputs: Vec<TensorId>,
    output: TensorId,
    axis: i64,
}

impl ConcatOperation {
    pub fn new(inputs: Vec<TensorId>, output: TensorId, axis: i64) -> Self {
        Self { inputs, output, axis }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        let axis = node.require_attribute(query_attribute_int(node.attributes(), "axis"), "axis")?;
        let inputs = (0..node.inputs.len()).map(|i| node.input(i)).collect::<Result<Vec<_>, _>>()?;
        if inputs.is_empty() {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Concat".to_string()));
        }
        Ok(Self {
            inputs,
            output: node.output(0)?,
            axis,
        })
    }
}

impl Operation for ConcatOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Concat
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        self.inputs.clone()
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![NDArrayNumericTensor::concat(inputs, self.axis)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_int("axis", self.axis)]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough; self.inputs.len()]
    }
}
