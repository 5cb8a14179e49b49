use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_float, query_attribute_float};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

/// Inference-form batch normalization using the stored running statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchNormalizationOperation {
    input: TensorId,
    scale: TensorId,
    bias: TensorId,
    mean: TensorId,
    var: TensorId,
    output: TensorId,
    epsilon: f32,
}

impl BatchNormalizationOperation {
    pub fn new(input: TensorId, scale: TensorId, bias: TensorId, mean: TensorId, var: TensorId, output: TensorId, epsilon: f32) -> Self {
        Self { input, scale, bias, mean, var, output, epsilon }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 5 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("BatchNormalization".to_string()));
        }
        // Running-statistics outputs only exist in training graphs
        if (1..node.outputs.len()).any(|i| node.optional_output(i).is_some()) {
            return Err(ONNXDecodingError::InvalidOperatorOutputs("BatchNormalization".to_string()));
        }
        Ok(Self {
            input: node.input(0)?,
            scale: node.input(1)?,
            bias: node.input(2)?,
            mean: node.input(3)?,
            var: node.input(4)?,
            output: node.output(0)?,
            epsilon: query_attribute_float(node.attributes(), "epsilon").unwrap_or(1e-5),
        })
    }
}

impl Operation for BatchNormalizationOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::BatchNormalization
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input, self.scale, self.bias, self.mean, self.var]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].batch_norm(inputs[1], inputs[2], inputs[3], inputs[4], self.epsilon)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_float("epsilon", self.epsilon)]
    }
}
