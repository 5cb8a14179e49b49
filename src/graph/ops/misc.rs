use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::TensorId;
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;

/// Broadcast to a fixed target shape, carried as an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandOperation {
    input: TensorId,
    output: TensorId,
    shape: Vec<i64>,
}

impl ExpandOperation {
    pub fn new(input: TensorId, output: TensorId, shape: Vec<i64>) -> Self {
        Self { input, output, shape }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 2 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Expand".to_string()));
        }
        let shape = node
            .fold_ints(1)?
            .ok_or_else(|| ONNXDecodingError::InvalidOperatorInputs("Expand".to_string()))?;
        Ok(Self::new(node.input(0)?, node.output(0)?, shape))
    }
}

impl Operation for ExpandOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Expand
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let shape = self
            .shape
            .iter()
            .map(|&d| usize::try_from(d).map_err(|_| EvalError::InvalidAttribute(format!("expand shape {:?}", self.shape))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vec![inputs[0].expand(&shape)?])
    }

    fn get_onnx_constant_inputs(&self) -> Vec<Vec<i64>> {
        vec![self.shape.clone()]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}

/// Elementwise select: `condition ? x : y`, with broadcasting.
#[derive(Clone, Debug, PartialEq)]
pub struct WhereOperation {
    condition: TensorId,
    x: TensorId,
    y: TensorId,
    output: TensorId,
}

impl WhereOperation {
    pub fn new(condition: TensorId, x: TensorId, y: TensorId, output: TensorId) -> Self {
        Self { condition, x, y, output }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 3 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Where".to_string()));
        }
        Ok(Self::new(node.input(0)?, node.input(1)?, node.input(2)?, node.output(0)?))
    }
}

impl Operation for WhereOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Where
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.condition, self.x, self.y]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].where_op(inputs[1], inputs[2])?])
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Bool, OnnxSlot::Passthrough, OnnxSlot::Passthrough]
    }
}
