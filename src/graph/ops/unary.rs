use crate::dtype::DType;
use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_float, make_attribute_int, query_attribute_float, query_attribute_int};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum WhichUnaryOperation {
    Relu,
    Sigmoid,
    Tanh,
    Exp,
    Log,
    Sqrt,
    Neg,
    Abs,
    Not,
    Identity,
    Gelu,
}

impl WhichUnaryOperation {
    fn kind(&self) -> OpKind {
        match self {
            WhichUnaryOperation::Relu => OpKind::Relu,
            WhichUnaryOperation::Sigmoid => OpKind::Sigmoid,
            WhichUnaryOperation::Tanh => OpKind::Tanh,
            WhichUnaryOperation::Exp => OpKind::Exp,
            WhichUnaryOperation::Log => OpKind::Log,
            WhichUnaryOperation::Sqrt => OpKind::Sqrt,
            WhichUnaryOperation::Neg => OpKind::Neg,
            WhichUnaryOperation::Abs => OpKind::Abs,
            WhichUnaryOperation::Not => OpKind::Not,
            WhichUnaryOperation::Identity => OpKind::Identity,
            WhichUnaryOperation::Gelu => OpKind::Gelu,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryOperation {
    input: TensorId,
    output: TensorId,
    which: WhichUnaryOperation,
}

impl UnaryOperation {
    pub fn new(input: TensorId, output: TensorId, which: WhichUnaryOperation) -> Self {
        Self { input, output, which }
    }

    pub(crate) fn from_onnx(node: &OnnxNode, which: WhichUnaryOperation) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 1 {
            return Err(ONNXDecodingError::InvalidOperatorInputs(which.to_string()));
        }
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            which,
        })
    }
}

impl Operation for UnaryOperation {
    fn get_op_kind(&self) -> OpKind {
        self.which.kind()
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let input = inputs[0];
        let out = match self.which {
            WhichUnaryOperation::Relu => input.relu()?,
            WhichUnaryOperation::Sigmoid => input.sigmoid()?,
            WhichUnaryOperation::Tanh => input.tanh()?,
            WhichUnaryOperation::Exp => input.exp()?,
            WhichUnaryOperation::Log => input.ln()?,
            WhichUnaryOperation::Sqrt => input.sqrt()?,
            WhichUnaryOperation::Neg => input.neg()?,
            WhichUnaryOperation::Abs => input.abs(),
            WhichUnaryOperation::Not => input.to_bool().not()?,
            WhichUnaryOperation::Identity => input.clone(),
            WhichUnaryOperation::Gelu => input.gelu()?,
        };
        Ok(vec![out])
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        vec![match self.which {
            WhichUnaryOperation::Not => OnnxSlot::Bool,
            WhichUnaryOperation::Identity => OnnxSlot::Passthrough,
            _ => OnnxSlot::Numeric,
        }]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeakyReluOperation {
    input: TensorId,
    output: TensorId,
    alpha: f32,
}

impl LeakyReluOperation {
    pub fn new(input: TensorId, output: TensorId, alpha: f32) -> Self {
        Self { input, output, alpha }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            alpha: query_attribute_float(node.attributes(), "alpha").unwrap_or(0.01),
        })
    }
}

impl Operation for LeakyReluOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::LeakyRelu
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].leaky_relu(self.alpha)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_float("alpha", self.alpha)]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SoftmaxOperation {
    input: TensorId,
    output: TensorId,
    axis: i64,
}

impl SoftmaxOperation {
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

impl Operation for SoftmaxOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Softmax
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].softmax(self.axis)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_int("axis", self.axis)]
    }
}

/// Identity in inference. In training, zeroes elements with probability
/// `ratio` and rescales the survivors.
#[derive(Clone, Debug, PartialEq)]
pub struct DropoutOperation {
    input: TensorId,
    output: TensorId,
    mask: Option<TensorId>,
    ratio: f32,
}

impl DropoutOperation {
    pub fn new(input: TensorId, output: TensorId, mask: Option<TensorId>, ratio: f32) -> Self {
        Self { input, output, mask, ratio }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        let ratio = query_attribute_float(node.attributes(), "ratio").unwrap_or(0.5);
        if !(0.0..1.0).contains(&ratio) {
            return Err(ONNXDecodingError::InvalidAttribute("Dropout".to_string(), format!("ratio {ratio}")));
        }
        Ok(Self {
            input: node.input(0)?,
            output: node.output(0)?,
            mask: node.optional_output(1),
            ratio,
        })
    }
}

impl Operation for DropoutOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Dropout
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        let mut outputs = vec![self.output];
        outputs.extend(self.mask);
        outputs
    }

    fn eval(&self, ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let input = inputs[0];
        let (out, mask) = if ctx.training {
            input.dropout(self.ratio, ctx.rng())?
        } else {
            let ones = NDArrayNumericTensor::scalar(DType::U8, 1.0).expand(input.shape())?;
            (input.clone(), ones)
        };
        let mut outputs = vec![out];
        if self.mask.is_some() {
            outputs.push(mask);
        }
        Ok(outputs)
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![make_attribute_float("ratio", self.ratio)]
    }

    fn get_onnx_bool_outputs(&self) -> Vec<bool> {
        let mut outputs = vec![false];
        if self.mask.is_some() {
            outputs.push(true);
        }
        outputs
    }
}
