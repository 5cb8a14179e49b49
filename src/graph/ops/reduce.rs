use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_int, make_attribute_ints, query_attribute_bool, query_attribute_ints};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum WhichReduceOperation {
    ReduceSum,
    ReduceMean,
}

/// Opset-11 reduction: `axes` is an attribute and omitting it reduces
/// over every axis.
#[derive(Clone, Debug, PartialEq)]
pub struct ReduceOperation {
    input: TensorId,
    output: TensorId,
    axes: Option<Vec<i64>>,
    keepdims: bool,
    which: WhichReduceOperation,
}

impl ReduceOperation {
    pub fn new(input: TensorId, output: TensorId, axes: Option<Vec<i64>>, keepdims: bool, which: WhichReduceOperation) -> Self {
        Self { input, output, axes, keepdims, which }
    }

    pub(crate) fn from_onnx(node: &OnnxNode, which: WhichReduceOperation) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 1 {
            return Err(ONNXDecodingError::InvalidOperatorInputs(which.to_string()));
        }
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            axes: query_attribute_ints(node.attributes(), "axes"),
            keepdims: query_attribute_bool(node.attributes(), "keepdims").unwrap_or(true),
            which,
        })
    }
}

impl Operation for ReduceOperation {
    fn get_op_kind(&self) -> OpKind {
        match self.which {
            WhichReduceOperation::ReduceSum => OpKind::ReduceSum,
            WhichReduceOperation::ReduceMean => OpKind::ReduceMean,
        }
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let axes = self.axes.as_deref();
        let out = match self.which {
            WhichReduceOperation::ReduceSum => inputs[0].reduce_sum(axes, self.keepdims)?,
            WhichReduceOperation::ReduceMean => inputs[0].reduce_mean(axes, self.keepdims)?,
        };
        Ok(vec![out])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        let mut attributes: Vec<_> = self.axes.iter().map(|axes| make_attribute_ints("axes", axes)).collect();
        attributes.push(make_attribute_int("keepdims", self.keepdims as i64));
        attributes
    }
}
