use serde::{Deserialize, Serialize};

/// Every native operator kind. The ONNX name table below is pinned to
/// default-domain opset 11.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display, strum_macros::EnumIter)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    MatMul,
    Gemm,
    Equal,
    Less,
    Greater,
    And,
    Or,
    Xor,
    Not,
    Relu,
    Sigmoid,
    Tanh,
    Exp,
    Log,
    Sqrt,
    Neg,
    Abs,
    Identity,
    LeakyRelu,
    Softmax,
    Dropout,
    Reshape,
    Flatten,
    Squeeze,
    Unsqueeze,
    Transpose,
    Expand,
    Concat,
    Gather,
    Slice,
    Cast,
    Where,
    ReduceSum,
    ReduceMean,
    Conv,
    MaxPool,
    BatchNormalization,
    Constant,
    Gelu,
}

const ONNX_NAME_TABLE: &[(OpKind, &str)] = &[
    (OpKind::Add, "Add"),
    (OpKind::Sub, "Sub"),
    (OpKind::Mul, "Mul"),
    (OpKind::Div, "Div"),
    (OpKind::Pow, "Pow"),
    (OpKind::MatMul, "MatMul"),
    (OpKind::Gemm, "Gemm"),
    (OpKind::Equal, "Equal"),
    (OpKind::Less, "Less"),
    (OpKind::Greater, "Greater"),
    (OpKind::And, "And"),
    (OpKind::Or, "Or"),
    (OpKind::Xor, "Xor"),
    (OpKind::Not, "Not"),
    (OpKind::Relu, "Relu"),
    (OpKind::Sigmoid, "Sigmoid"),
    (OpKind::Tanh, "Tanh"),
    (OpKind::Exp, "Exp"),
    (OpKind::Log, "Log"),
    (OpKind::Sqrt, "Sqrt"),
    (OpKind::Neg, "Neg"),
    (OpKind::Abs, "Abs"),
    (OpKind::Identity, "Identity"),
    (OpKind::LeakyRelu, "LeakyRelu"),
    (OpKind::Softmax, "Softmax"),
    (OpKind::Dropout, "Dropout"),
    (OpKind::Reshape, "Reshape"),
    (OpKind::Flatten, "Flatten"),
    (OpKind::Squeeze, "Squeeze"),
    (OpKind::Unsqueeze, "Unsqueeze"),
    (OpKind::Transpose, "Transpose"),
    (OpKind::Expand, "Expand"),
    (OpKind::Concat, "Concat"),
    (OpKind::Gather, "Gather"),
    (OpKind::Slice, "Slice"),
    (OpKind::Cast, "Cast"),
    (OpKind::Where, "Where"),
    (OpKind::ReduceSum, "ReduceSum"),
    (OpKind::ReduceMean, "ReduceMean"),
    (OpKind::Conv, "Conv"),
    (OpKind::MaxPool, "MaxPool"),
    (OpKind::BatchNormalization, "BatchNormalization"),
    (OpKind::Constant, "Constant"),
];

impl OpKind {
    /// ONNX `op_type` for this kind, or `None` when opset 11 has no equivalent.
    pub fn onnx_op_type(&self) -> Option<&'static str> {
        ONNX_NAME_TABLE.iter().find(|(kind, _)| kind == self).map(|(_, name)| *name)
    }

    pub fn from_onnx_op_type(op_type: &str) -> Option<Self> {
        ONNX_NAME_TABLE.iter().find(|(_, name)| *name == op_type).map(|(kind, _)| *kind)
    }

    /// Kinds whose output ONNX types as `BOOL`.
    pub fn produces_bool(&self) -> bool {
        matches!(
            self,
            OpKind::Equal | OpKind::Less | OpKind::Greater | OpKind::And | OpKind::Or | OpKind::Xor | OpKind::Not
        )
    }

    /// Kinds that fail with `IllegalEmptyTensor` on a zero-sized input.
    pub fn rejects_empty_inputs(&self) -> bool {
        matches!(
            self,
            OpKind::MatMul
                | OpKind::Gemm
                | OpKind::Conv
                | OpKind::MaxPool
                | OpKind::BatchNormalization
                | OpKind::Softmax
                | OpKind::ReduceSum
                | OpKind::ReduceMean
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn name_table_is_a_bijection() {
        for kind in OpKind::iter() {
            if let Some(name) = kind.onnx_op_type() {
                assert_eq!(OpKind::from_onnx_op_type(name), Some(kind));
                assert_eq!(name, kind.to_string());
            }
        }
    }

    #[test]
    fn gelu_has_no_opset_11_mapping() {
        assert_eq!(OpKind::Gelu.onnx_op_type(), None);
        assert_eq!(OpKind::from_onnx_op_type("Gelu"), None);
        assert_eq!(OpKind::from_onnx_op_type("LSTM"), None);
    }
}
