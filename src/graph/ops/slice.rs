use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::TensorId;
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;

/// ONNX Slice with its bound tensors held as attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceOperation {
    input: TensorId,
    output: TensorId,
    starts: Vec<i64>,
    ends: Vec<i64>,
    axes: Option<Vec<i64>>,
    steps: Option<Vec<i64>>,
}

impl SliceOperation {
    pub fn new(input: TensorId, output: TensorId, starts: Vec<i64>, ends: Vec<i64>, axes: Option<Vec<i64>>, steps: Option<Vec<i64>>) -> Self {
        Self { input, output, starts, ends, axes, steps }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() < 3 || node.inputs.len() > 5 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Slice".to_string()));
        }
        let required = |index: usize| {
            node.fold_ints(index)?
                .ok_or_else(|| ONNXDecodingError::InvalidOperatorInputs("Slice".to_string()))
        };
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            starts: required(1)?,
            ends: required(2)?,
            axes: node.fold_ints(3)?,
            steps: node.fold_ints(4)?,
        })
    }
}

impl Operation for SliceOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Slice
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].slice(&self.starts, &self.ends, self.axes.as_deref(), self.steps.as_deref())?])
    }

    /// Axes and steps are always spelled out so the node is self-describing.
    fn get_onnx_constant_inputs(&self) -> Vec<Vec<i64>> {
        let axes = self.axes.clone().unwrap_or_else(|| (0..self.starts.len() as i64).collect());
        let steps = self.steps.clone().unwrap_or_else(|| vec![1; self.starts.len()]);
        vec![self.starts.clone(), self.ends.clone(), axes, steps]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}
