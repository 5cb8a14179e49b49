use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, OnnxSlot, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{TensorId, make_attribute_float, make_attribute_int, query_attribute_bool, query_attribute_float};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum WhichBinaryOperation {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    MatMul,
    Equal,
    Less,
    Greater,
    And,
    Or,
    Xor,
}

impl WhichBinaryOperation {
    fn kind(&self) -> OpKind {
        match self {
            WhichBinaryOperation::Add => OpKind::Add,
            WhichBinaryOperation::Sub => OpKind::Sub,
            WhichBinaryOperation::Mul => OpKind::Mul,
            WhichBinaryOperation::Div => OpKind::Div,
            WhichBinaryOperation::Pow => OpKind::Pow,
            WhichBinaryOperation::MatMul => OpKind::MatMul,
            WhichBinaryOperation::Equal => OpKind::Equal,
            WhichBinaryOperation::Less => OpKind::Less,
            WhichBinaryOperation::Greater => OpKind::Greater,
            WhichBinaryOperation::And => OpKind::And,
            WhichBinaryOperation::Or => OpKind::Or,
            WhichBinaryOperation::Xor => OpKind::Xor,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryOperation {
    a: TensorId,
    b: TensorId,
    output: TensorId,
    which: WhichBinaryOperation,
}

impl BinaryOperation {
    pub fn new(a: TensorId, b: TensorId, output: TensorId, which: WhichBinaryOperation) -> Self {
        Self { a, b, output, which }
    }

    pub(crate) fn from_onnx(node: &OnnxNode, which: WhichBinaryOperation) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 2 {
            return Err(ONNXDecodingError::InvalidOperatorInputs(which.to_string()));
        }
        Ok(Self {
            a: node.input(0)?,
            b: node.input(1)?,
            output: node.output(0)?,
            which,
        })
    }
}

impl Operation for BinaryOperation {
    fn get_op_kind(&self) -> OpKind {
        self.which.kind()
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.a, self.b]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let (a, b) = (inputs[0], inputs[1]);
        let out = match self.which {
            WhichBinaryOperation::Add => NDArrayNumericTensor::add(a, b)?,
            WhichBinaryOperation::Sub => NDArrayNumericTensor::sub(a, b)?,
            WhichBinaryOperation::Mul => NDArrayNumericTensor::mul(a, b)?,
            WhichBinaryOperation::Div => NDArrayNumericTensor::div(a, b)?,
            WhichBinaryOperation::Pow => NDArrayNumericTensor::pow(a, b)?,
            WhichBinaryOperation::MatMul => NDArrayNumericTensor::matmul(a, b)?,
            WhichBinaryOperation::Equal => NDArrayNumericTensor::equal(a, b)?,
            WhichBinaryOperation::Less => NDArrayNumericTensor::less(a, b)?,
            WhichBinaryOperation::Greater => NDArrayNumericTensor::greater(a, b)?,
            WhichBinaryOperation::And => NDArrayNumericTensor::and(&a.to_bool(), &b.to_bool())?,
            WhichBinaryOperation::Or => NDArrayNumericTensor::or(&a.to_bool(), &b.to_bool())?,
            WhichBinaryOperation::Xor => NDArrayNumericTensor::xor(&a.to_bool(), &b.to_bool())?,
        };
        Ok(vec![out])
    }

    fn get_onnx_input_slots(&self) -> Vec<OnnxSlot> {
        let slot = match self.which {
            WhichBinaryOperation::And | WhichBinaryOperation::Or | WhichBinaryOperation::Xor => OnnxSlot::Bool,
            WhichBinaryOperation::Equal => OnnxSlot::Passthrough,
            _ => OnnxSlot::Numeric,
        };
        vec![slot, slot]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GemmOperation {
    a: TensorId,
    b: TensorId,
    c: Option<TensorId>,
    output: TensorId,
    alpha: f32,
    beta: f32,
    trans_a: bool,
    trans_b: bool,
}

impl GemmOperation {
    pub fn new(a: TensorId, b: TensorId, c: Option<TensorId>, output: TensorId, alpha: f32, beta: f32, trans_a: bool, trans_b: bool) -> Self {
        Self { a, b, c, output, alpha, beta, trans_a, trans_b }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() < 2 || node.inputs.len() > 3 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Gemm".to_string()));
        }
        Ok(Self {
            a: node.input(0)?,
            b: node.input(1)?,
            c: node.optional_input(2),
            output: node.output(0)?,
            alpha: query_attribute_float(node.attributes(), "alpha").unwrap_or(1.0),
            beta: query_attribute_float(node.attributes(), "beta").unwrap_or(1.0),
            trans_a: query_attribute_bool(node.attributes(), "transA").unwrap_or(false),
            trans_b: query_attribute_bool(node.attributes(), "transB").unwrap_or(false),
        })
    }
}

impl Operation for GemmOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Gemm
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        let mut inputs = vec![self.a, self.b];
        inputs.extend(self.c);
        inputs
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let c = inputs.get(2).copied();
        let out = NDArrayNumericTensor::gemm(inputs[0], inputs[1], c, self.alpha, self.beta, self.trans_a, self.trans_b)?;
        Ok(vec![out])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        vec![
            make_attribute_float("alpha", self.alpha),
            make_attribute_float("beta", self.beta),
            make_attribute_int("transA", self.trans_a as i64),
            make_attribute_int("transB", self.trans_b as i64),
        ]
    }
}
