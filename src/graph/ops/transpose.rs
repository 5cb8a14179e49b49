use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_ints, query_attribute_ints};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Clone, Debug, PartialEq)]
pub struct TransposeOperation {
    input: TensorId,
    output: TensorId,
    perm: Option<Vec<i64>>,
}

impl TransposeOperation {
    pub fn new(input: TensorId, output: TensorId, perm: Option<Vec<i64>>) -> Self {
        Self { input, output, perm }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 1 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Transpose".to_string()));
        }
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            perm: query_attribute_ints(node.attributes(), "perm"),
        })
    }
}

impl Operation for TransposeOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Transpose
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].transpose(self.perm.as_deref())?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        self.perm.iter().map(|perm| make_attribute_ints("perm", perm)).collect()
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}
