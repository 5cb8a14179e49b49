pub mod builder;
pub mod observer;
pub mod ops;
pub mod registry;

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::dtype::DType;
use crate::eval_backend::EvalContext;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;
use ops::{AnyOperation, EvalError, Operation};

pub type TensorId = usize;
pub type OperationId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    Known(usize),
    /// A named dimension (`dim_param`) that accepts any size.
    Symbolic(String),
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Known(x) => write!(f, "{x}"),
            Dimension::Symbolic(x) => write!(f, "{x}"),
        }
    }
}

pub(crate) fn known_dims(shape: &[usize]) -> Vec<Dimension> {
    shape.iter().map(|&d| Dimension::Known(d)).collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum TensorRole {
    Input,
    Output,
    Weight,
    Constant,
    Intermediate,
}

#[derive(Clone, Debug)]
pub struct TensorInfo {
    pub name: Option<String>,
    pub role: TensorRole,
    pub trainable: bool,
    pub producer: Option<OperationId>,
    pub dtype: Option<DType>,
    pub shape: Option<Vec<Dimension>>,
    pub value: Option<NDArrayNumericTensor>,
}

impl TensorInfo {
    pub(crate) fn new(name: Option<String>, role: TensorRole) -> Self {
        Self {
            name,
            role,
            trainable: false,
            producer: None,
            dtype: None,
            shape: None,
            value: None,
        }
    }

    pub(crate) fn with_value(name: Option<String>, role: TensorRole, value: NDArrayNumericTensor) -> Self {
        Self {
            dtype: Some(value.dtype()),
            shape: Some(known_dims(value.shape())),
            value: Some(value),
            ..Self::new(name, role)
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.producer.is_none()
    }

    /// Leaves serialized as initializers rather than graph inputs.
    pub fn is_initializer(&self) -> bool {
        self.is_leaf() && (self.trainable || matches!(self.role, TensorRole::Weight | TensorRole::Constant))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Tensor \"{name}\" expected {expected}, found {found}")]
pub struct ShapeMismatch {
    pub name: String,
    pub expected: String,
    pub found: String,
}

fn describe(dtype: Option<DType>, shape: Option<&[Dimension]>) -> String {
    let dtype = dtype.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string());
    match shape {
        Some(shape) => format!("{dtype}[{}]", shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")),
        None => format!("{dtype}[..]"),
    }
}

/// Check a concrete buffer against declared dtype and shape. Symbolic
/// dimensions match any size.
pub(crate) fn check_tensor_matches(
    name: &str,
    tensor: &NDArrayNumericTensor,
    dtype: Option<DType>,
    shape: Option<&[Dimension]>,
) -> Result<(), ShapeMismatch> {
    let mut ok = dtype.is_none_or(|d| d == tensor.dtype());
    if let Some(shape) = shape {
        ok &= shape.len() == tensor.rank()
            && shape.iter().zip(tensor.shape()).all(|(a, b)| match a {
                Dimension::Known(a) => a == b,
                Dimension::Symbolic(_) => true,
            });
    }
    if ok {
        Ok(())
    } else {
        Err(ShapeMismatch {
            name: name.to_string(),
            expected: describe(dtype, shape),
            found: describe(Some(tensor.dtype()), Some(&known_dims(tensor.shape()))),
        })
    }
}

#[derive(Clone, Debug)]
pub struct GraphOperation {
    pub name: Option<String>,
    pub op: AnyOperation,
}

impl GraphOperation {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.op.get_op_kind().to_string())
    }
}

/// Operator queue in producer-before-consumer order, plus the tensor mapping.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    tensors: HashMap<TensorId, TensorInfo>,
    tensors_by_name: HashMap<String, TensorId>,
    operations: Vec<GraphOperation>,
    inputs: Vec<TensorId>,
    outputs: Vec<(String, TensorId)>,
    next_tensor_id: TensorId,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_tensor_info(&self, id: TensorId) -> Option<&TensorInfo> {
        self.tensors.get(&id)
    }

    pub fn get_tensor_by_name(&self, name: &str) -> Option<TensorId> {
        self.tensors_by_name.get(name).copied()
    }

    pub fn get_tensors_by_name(&self) -> &HashMap<String, TensorId> {
        &self.tensors_by_name
    }

    /// Tensors in allocation order.
    pub fn tensors(&self) -> impl Iterator<Item = (TensorId, &TensorInfo)> {
        (0..self.next_tensor_id).filter_map(|id| self.tensors.get(&id).map(|info| (id, info)))
    }

    pub fn get_operations(&self) -> &[GraphOperation] {
        &self.operations
    }

    pub fn get_inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn get_outputs(&self) -> &[(String, TensorId)] {
        &self.outputs
    }

    pub fn get_value(&self, id: TensorId) -> Option<&NDArrayNumericTensor> {
        self.tensors.get(&id).and_then(|t| t.value.as_ref())
    }

    pub fn tensor_display_name(&self, id: TensorId) -> String {
        self.tensors
            .get(&id)
            .and_then(|t| t.name.clone())
            .unwrap_or_else(|| format!("#{id}"))
    }

    pub(crate) fn add_tensor(&mut self, info: TensorInfo) -> Result<TensorId, EvalError> {
        let id = self.next_tensor_id;
        if let Some(name) = &info.name {
            if self.tensors_by_name.contains_key(name) {
                return Err(EvalError::NameConflict(name.clone()));
            }
            self.tensors_by_name.insert(name.clone(), id);
        }
        self.tensors.insert(id, info);
        self.next_tensor_id += 1;
        Ok(id)
    }

    pub(crate) fn set_tensor_name(&mut self, id: TensorId, name: &str) -> Result<(), EvalError> {
        match self.tensors_by_name.get(name) {
            Some(&existing) if existing == id => return Ok(()),
            Some(_) => return Err(EvalError::NameConflict(name.to_string())),
            None => {}
        }
        let info = self.tensors.get_mut(&id).ok_or_else(|| EvalError::UnknownTensor(format!("#{id}")))?;
        if let Some(old) = info.name.replace(name.to_string()) {
            self.tensors_by_name.remove(&old);
        }
        self.tensors_by_name.insert(name.to_string(), id);
        Ok(())
    }

    pub(crate) fn tensor_mut(&mut self, id: TensorId) -> Result<&mut TensorInfo, EvalError> {
        self.tensors.get_mut(&id).ok_or_else(|| EvalError::UnknownTensor(format!("#{id}")))
    }

    pub(crate) fn declare_input(&mut self, id: TensorId) {
        if !self.inputs.contains(&id) {
            self.inputs.push(id);
        }
    }

    pub(crate) fn declare_output(&mut self, name: &str, id: TensorId) {
        self.outputs.push((name.to_string(), id));
    }

    /// Evaluate `op` against the values currently stored in the mapping.
    /// Nothing is written back.
    pub(crate) fn evaluate_operation(
        &self,
        op: &GraphOperation,
        ctx: &mut EvalContext,
    ) -> Result<Vec<(TensorId, NDArrayNumericTensor)>, EvalError> {
        let kind = op.op.get_op_kind();
        let mut inputs = Vec::new();
        for id in op.op.get_inputs() {
            let value = self.get_value(id).ok_or_else(|| EvalError::MissingDependency {
                op: op.display_name(),
                tensor: self.tensor_display_name(id),
            })?;
            if value.is_empty() && kind.rejects_empty_inputs() {
                return Err(EvalError::IllegalEmptyTensor {
                    op: op.display_name(),
                    tensor: self.tensor_display_name(id),
                });
            }
            inputs.push(value);
        }
        let outputs = op.op.eval(ctx, &inputs)?;
        Ok(op.op.get_outputs().into_iter().zip(outputs).collect())
    }

    pub(crate) fn store_outputs(&mut self, results: Vec<(TensorId, NDArrayNumericTensor)>) -> Result<(), EvalError> {
        for (id, value) in results {
            let info = self.tensor_mut(id)?;
            // Declared inputs and outputs keep their (possibly symbolic) shapes
            if info.role == TensorRole::Intermediate || info.shape.is_none() {
                info.dtype = Some(value.dtype());
                info.shape = Some(known_dims(value.shape()));
            }
            info.value = Some(value);
        }
        Ok(())
    }

    pub(crate) fn execute_operation(&mut self, index: usize, ctx: &mut EvalContext) -> Result<Vec<TensorId>, EvalError> {
        let op = self.operations.get(index).ok_or(EvalError::InvalidInput(format!("no operation at {index}")))?;
        let results = self.evaluate_operation(op, ctx)?;
        let ids = results.iter().map(|(id, _)| *id).collect();
        self.store_outputs(results)?;
        Ok(ids)
    }

    pub(crate) fn append_operation(&mut self, op: GraphOperation) -> OperationId {
        let id = self.operations.len();
        for output in op.op.get_outputs() {
            if let Some(info) = self.tensors.get_mut(&output) {
                info.producer = Some(id);
            }
        }
        self.operations.push(op);
        id
    }
}

pub(crate) fn query_attribute_float(attributes: &[onnx::AttributeProto], name: &str) -> Option<f32> {
    attributes.iter()
        .find(|attr| attr.name == name && attr.r#type == onnx::attribute_proto::AttributeType::Float as i32)
        .map(|attr| attr.f)
}

pub(crate) fn query_attribute_int(attributes: &[onnx::AttributeProto], name: &str) -> Option<i64> {
    attributes.iter()
        .find(|attr| attr.name == name && attr.r#type == onnx::attribute_proto::AttributeType::Int as i32)
        .map(|attr| attr.i)
}

pub(crate) fn query_attribute_ints(attributes: &[onnx::AttributeProto], name: &str) -> Option<Vec<i64>> {
    attributes.iter()
        .find(|attr| attr.name == name && attr.r#type == onnx::attribute_proto::AttributeType::Ints as i32)
        .map(|attr| attr.ints.clone())
}

pub(crate) fn query_attribute_bool(attributes: &[onnx::AttributeProto], name: &str) -> Option<bool> {
    query_attribute_int(attributes, name).map(|x| x != 0)
}

pub(crate) fn query_attribute_string(attributes: &[onnx::AttributeProto], name: &str) -> Option<String> {
    attributes.iter()
        .find(|attr| attr.name == name && attr.r#type == onnx::attribute_proto::AttributeType::String as i32)
        .map(|attr| String::from_utf8_lossy(&attr.s).into_owned())
}

pub(crate) fn query_attribute_tensor(attributes: &[onnx::AttributeProto], name: &str) -> Option<onnx::TensorProto> {
    attributes.iter()
        .find(|attr| attr.name == name && attr.r#type == onnx::attribute_proto::AttributeType::Tensor as i32)
        .and_then(|attr| attr.t.clone())
}

pub(crate) fn make_attribute_float(name: &str, value: f32) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: onnx::attribute_proto::AttributeType::Float as i32,
        f: value,
        ..Default::default()
    }
}

pub(crate) fn make_attribute_int(name: &str, value: i64) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: onnx::attribute_proto::AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

pub(crate) fn make_attribute_ints(name: &str, values: &[i64]) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: onnx::attribute_proto::AttributeType::Ints as i32,
        ints: values.to_vec(),
        ..Default::default()
    }
}

pub(crate) fn make_attribute_string(name: &str, value: &str) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: onnx::attribute_proto::AttributeType::String as i32,
        s: value.as_bytes().to_vec(),
        ..Default::default()
    }
}

pub(crate) fn make_attribute_tensor(name: &str, value: onnx::TensorProto) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: onnx::attribute_proto::AttributeType::Tensor as i32,
        t: Some(value),
        ..Default::default()
    }
}
