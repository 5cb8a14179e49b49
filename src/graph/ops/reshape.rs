use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_int, make_attribute_ints, query_attribute_int, query_attribute_ints};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

/// Resolve an ONNX reshape target: `0` copies the input dimension and a
/// single `-1` absorbs the remaining elements.
fn resolve_reshape(input_shape: &[usize], target: &[i64]) -> Result<Vec<usize>, EvalError> {
    let mut out = Vec::with_capacity(target.len());
    let mut infer_at = None;
    for (i, &d) in target.iter().enumerate() {
        match d {
            0 => out.push(*input_shape.get(i).ok_or_else(|| EvalError::InvalidAttribute(format!("reshape {target:?} copies a missing dimension")))?),
            -1 if infer_at.is_none() => {
                infer_at = Some(i);
                out.push(1);
            }
            d if d > 0 => out.push(d as usize),
            _ => return Err(EvalError::InvalidAttribute(format!("reshape target {target:?}"))),
        }
    }
    if let Some(i) = infer_at {
        let total: usize = input_shape.iter().product();
        let known: usize = out.iter().product();
        if known == 0 || total % known != 0 {
            return Err(EvalError::InvalidAttribute(format!("cannot infer {target:?} from {input_shape:?}")));
        }
        out[i] = total / known;
    }
    Ok(out)
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReshapeOperation {
    input: TensorId,
    output: TensorId,
    shape: Vec<i64>,
}

impl ReshapeOperation {
    pub fn new(input: TensorId, output: TensorId, shape: Vec<i64>) -> Self {
        Self { input, output, shape }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        let shape = node
            .fold_ints(1)?
            .ok_or_else(|| ONNXDecodingError::InvalidOperatorInputs("Reshape".to_string()))?;
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            shape,
        })
    }
}

impl Operation for ReshapeOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Reshape
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let shape = resolve_reshape(inputs[0].shape(), &self.shape)?;
        Ok(vec![inputs[0].reshape(&shape)?])
    }

    fn get_onnx_constant_inputs(&self) -> Vec<Vec<i64>> {
        vec![self.shape.clone()]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlattenOperation {
    input: TensorId,
    output: TensorId,
    axis: i64,
}

impl FlattenOperation {
    pub fn new(input: TensorId, output: TensorId, axis: i64) -> Self {
        Self { input, output, axis }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            axis: query_attribute_int(node.attributes(), "axis").unwrap_or(1),
        })
    }
}

impl Operation for FlattenOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Flatten
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].flatten(self.axis)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_int("axis", self.axis)]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SqueezeOperation {
    input: TensorId,
    output: TensorId,
    axes: Option<Vec<i64>>,
}

impl SqueezeOperation {
    pub fn new(input: TensorId, output: TensorId, axes: Option<Vec<i64>>) -> Self {
        Self { input, output, axes }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            axes: query_attribute_ints(node.attributes(), "axes"),
        })
    }
}

impl Operation for SqueezeOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Squeeze
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].squeeze(self.axes.as_deref())?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        self.axes.iter().map(|axes| make_attribute_ints("axes", axes)).collect()
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnsqueezeOperation {
    input: TensorId,
    output: TensorId,
    axes: Vec<i64>,
}

impl UnsqueezeOperation {
    pub fn new(input: TensorId, output: TensorId, axes: Vec<i64>) -> Self {
        Self { input, output, axes }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        let axes = node.require_attribute(query_attribute_ints(node.attributes(), "axes"), "axes")?;
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            axes,
        })
    }
}

impl Operation for UnsqueezeOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Unsqueeze
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].unsqueeze(&self.axes)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_ints("axes", &self.axes)]
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![OnnxSlot::Passthrough]
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_reshape;

    #[test]
    fn reshape_targets_copy_and_infer() {
        assert_eq!(resolve_reshape(&[2, 3, 4], &[0, -1]).unwrap(), vec![2, 12]);
        assert_eq!(resolve_reshape(&[2, 3, 4], &[-1]).unwrap(), vec![24]);
        assert!(resolve_reshape(&[2, 3, 4], &[-1, -1]).is_err());
        assert!(resolve_reshape(&[2, 3, 4], &[5, -1]).is_err());
    }
}
