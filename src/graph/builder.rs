use std::sync::Arc;

use crate::dtype::DType;
use crate::eval_backend::EvalContext;
use crate::graph::ops::*;
use crate::graph::{Dimension, Graph, GraphOperation, OperationId, TensorId, TensorInfo, TensorRole};
use crate::ndarray_backend::NDArrayNumericTensor;

/// Eager graph tracer. Every pushed operation runs immediately against the
/// values already in the graph, so the finished graph carries a concrete
/// value for every tensor.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
    ctx: EvalContext,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(ctx: EvalContext) -> Self {
        Self { graph: Graph::new(), ctx }
    }

    pub fn input(&mut self, name: &str, value: NDArrayNumericTensor) -> Result<TensorId, EvalError> {
        let id = self.graph.add_tensor(TensorInfo::with_value(Some(name.to_string()), TensorRole::Input, value))?;
        self.graph.declare_input(id);
        Ok(id)
    }

    /// Declared input whose recorded shape may be symbolic while its value is concrete.
    pub(crate) fn declared_input(&mut self, name: &str, dtype: DType, shape: Vec<Dimension>, value: NDArrayNumericTensor) -> Result<TensorId, EvalError> {
        let mut info = TensorInfo::with_value(Some(name.to_string()), TensorRole::Input, value);
        info.dtype = Some(dtype);
        info.shape = Some(shape);
        let id = self.graph.add_tensor(info)?;
        self.graph.declare_input(id);
        Ok(id)
    }

    pub fn weight(&mut self, name: &str, value: NDArrayNumericTensor, trainable: bool) -> Result<TensorId, EvalError> {
        let mut info = TensorInfo::with_value(Some(name.to_string()), TensorRole::Weight, value);
        info.trainable = trainable;
        self.graph.add_tensor(info)
    }

    pub fn constant(&mut self, name: Option<&str>, value: NDArrayNumericTensor) -> Result<TensorId, EvalError> {
        self.graph.add_tensor(TensorInfo::with_value(name.map(str::to_string), TensorRole::Constant, value))
    }

    /// Allocate a valueless tensor for an operation about to be pushed.
    pub fn new_output(&mut self, name: Option<&str>) -> Result<TensorId, EvalError> {
        self.graph.add_tensor(TensorInfo::new(name.map(str::to_string), TensorRole::Intermediate))
    }

    /// Validate, execute and append `op`. Inputs must already hold values
    /// and outputs must be fresh tensors nobody produces yet.
    pub fn push_operation(&mut self, name: Option<&str>, op: AnyOperation) -> Result<OperationId, EvalError> {
        for input in op.get_inputs() {
            if self.graph.get_tensor_info(input).is_none() {
                return Err(EvalError::UnknownTensor(format!("#{input}")));
            }
        }
        for output in op.get_outputs() {
            let info = self.graph.get_tensor_info(output).ok_or_else(|| EvalError::UnknownTensor(format!("#{output}")))?;
            if info.producer.is_some() || info.value.is_some() {
                return Err(EvalError::InvalidInput(format!(
                    "{} is already produced",
                    self.graph.tensor_display_name(output)
                )));
            }
        }
        let op = GraphOperation {
            name: name.map(str::to_string),
            op,
        };
        let results = self.graph.evaluate_operation(&op, &mut self.ctx)?;
        let id = self.graph.append_operation(op);
        self.graph.store_outputs(results)?;
        Ok(id)
    }

    fn push_single(&mut self, make: impl FnOnce(TensorId) -> AnyOperation) -> Result<TensorId, EvalError> {
        let output = self.new_output(None)?;
        self.push_operation(None, make(output))?;
        Ok(output)
    }

    pub fn value(&self, id: TensorId) -> Option<&NDArrayNumericTensor> {
        self.graph.get_value(id)
    }

    pub fn name_tensor(&mut self, id: TensorId, name: &str) -> Result<(), EvalError> {
        self.graph.set_tensor_name(id, name)
    }

    pub fn set_trainable(&mut self, id: TensorId, trainable: bool) -> Result<(), EvalError> {
        self.graph.tensor_mut(id)?.trainable = trainable;
        Ok(())
    }

    pub fn set_training(&mut self, training: bool) {
        self.ctx.training = training;
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn finish(self) -> Graph {
        self.graph
    }

    pub(crate) fn into_parts(self) -> (Graph, EvalContext) {
        (self.graph, self.ctx)
    }

    pub fn binary(&mut self, which: WhichBinaryOperation, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Binary(BinaryOperation::new(a, b, out, which)))
    }

    pub fn add(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Add, a, b)
    }

    pub fn sub(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Sub, a, b)
    }

    pub fn mul(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Mul, a, b)
    }

    pub fn div(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Div, a, b)
    }

    pub fn pow(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Pow, a, b)
    }

    pub fn matmul(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::MatMul, a, b)
    }

    pub fn equal(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Equal, a, b)
    }

    pub fn less(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Less, a, b)
    }

    pub fn greater(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Greater, a, b)
    }

    pub fn and(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::And, a, b)
    }

    pub fn or(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Or, a, b)
    }

    pub fn xor(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EvalError> {
        self.binary(WhichBinaryOperation::Xor, a, b)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn gemm(&mut self, a: TensorId, b: TensorId, c: Option<TensorId>, alpha: f32, beta: f32, trans_a: bool, trans_b: bool) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Gemm(GemmOperation::new(a, b, c, out, alpha, beta, trans_a, trans_b)))
    }

    pub fn unary(&mut self, which: WhichUnaryOperation, x: TensorId) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Unary(UnaryOperation::new(x, out, which)))
    }

    pub fn relu(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Relu, x)
    }

    pub fn sigmoid(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Sigmoid, x)
    }

    pub fn tanh(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Tanh, x)
    }

    pub fn exp(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Exp, x)
    }

    pub fn log(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Log, x)
    }

    pub fn sqrt(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Sqrt, x)
    }

    pub fn neg(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Neg, x)
    }

    pub fn abs(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Abs, x)
    }

    pub fn not(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Not, x)
    }

    pub fn identity(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Identity, x)
    }

    pub fn gelu(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.unary(WhichUnaryOperation::Gelu, x)
    }

    pub fn leaky_relu(&mut self, x: TensorId, alpha: f32) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::LeakyRelu(LeakyReluOperation::new(x, out, alpha)))
    }

    pub fn softmax(&mut self, x: TensorId, axis: i64) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Softmax(SoftmaxOperation::new(x, out, axis)))
    }

    /// Returns the output and its keep mask.
    pub fn dropout(&mut self, x: TensorId, ratio: f32) -> Result<(TensorId, TensorId), EvalError> {
        if !(0.0..1.0).contains(&ratio) {
            return Err(EvalError::InvalidAttribute(format!("dropout ratio {ratio}")));
        }
        let output = self.new_output(None)?;
        let mask = self.new_output(None)?;
        self.push_operation(None, AnyOperation::Dropout(DropoutOperation::new(x, output, Some(mask), ratio)))?;
        Ok((output, mask))
    }

    pub fn reshape(&mut self, x: TensorId, shape: &[i64]) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Reshape(ReshapeOperation::new(x, out, shape.to_vec())))
    }

    pub fn flatten(&mut self, x: TensorId, axis: i64) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Flatten(FlattenOperation::new(x, out, axis)))
    }

    pub fn squeeze(&mut self, x: TensorId, axes: Option<&[i64]>) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Squeeze(SqueezeOperation::new(x, out, axes.map(<[i64]>::to_vec))))
    }

    pub fn unsqueeze(&mut self, x: TensorId, axes: &[i64]) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Unsqueeze(UnsqueezeOperation::new(x, out, axes.to_vec())))
    }

    pub fn transpose(&mut self, x: TensorId, perm: Option<&[i64]>) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Transpose(TransposeOperation::new(x, out, perm.map(<[i64]>::to_vec))))
    }

    pub fn expand(&mut self, x: TensorId, shape: &[i64]) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Expand(ExpandOperation::new(x, out, shape.to_vec())))
    }

    pub fn concat(&mut self, inputs: &[TensorId], axis: i64) -> Result<TensorId, EvalError> {
        if inputs.is_empty() {
            return Err(EvalError::InvalidInput("Concat".to_string()));
        }
        self.push_single(|out| AnyOperation::Concat(ConcatOperation::new(inputs.to_vec(), out, axis)))
    }

    pub fn gather(&mut self, data: TensorId, indices: TensorId, axis: i64) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Gather(GatherOperation::new(data, indices, out, axis)))
    }

    pub fn slice(&mut self, x: TensorId, starts: &[i64], ends: &[i64], axes: Option<&[i64]>, steps: Option<&[i64]>) -> Result<TensorId, EvalError> {
        self.push_single(|out| {
            AnyOperation::Slice(SliceOperation::new(
                x,
                out,
                starts.to_vec(),
                ends.to_vec(),
                axes.map(<[i64]>::to_vec),
                steps.map(<[i64]>::to_vec),
            ))
        })
    }

    pub fn cast(&mut self, x: TensorId, to: DType) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Cast(CastOperation::new(x, out, to)))
    }

    /// Normalize to a 0/1 mask that exports as ONNX `BOOL`.
    pub fn cast_to_bool(&mut self, x: TensorId) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Cast(CastOperation::new_to_bool(x, out)))
    }

    pub fn where_op(&mut self, condition: TensorId, x: TensorId, y: TensorId) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::Where(WhereOperation::new(condition, x, y, out)))
    }

    pub fn reduce_sum(&mut self, x: TensorId, axes: Option<&[i64]>, keepdims: bool) -> Result<TensorId, EvalError> {
        self.push_single(|out| {
            AnyOperation::Reduce(ReduceOperation::new(x, out, axes.map(<[i64]>::to_vec), keepdims, WhichReduceOperation::ReduceSum))
        })
    }

    pub fn reduce_mean(&mut self, x: TensorId, axes: Option<&[i64]>, keepdims: bool) -> Result<TensorId, EvalError> {
        self.push_single(|out| {
            AnyOperation::Reduce(ReduceOperation::new(x, out, axes.map(<[i64]>::to_vec), keepdims, WhichReduceOperation::ReduceMean))
        })
    }

    pub fn conv(&mut self, x: TensorId, weight: TensorId, bias: Option<TensorId>, descriptor: ConvDescriptor) -> Result<TensorId, EvalError> {
        let descriptor = Arc::new(descriptor);
        self.push_single(|out| AnyOperation::Conv(ConvOperation::new(x, weight, bias, out, descriptor)))
    }

    pub fn max_pool(&mut self, x: TensorId, descriptor: ConvDescriptor) -> Result<TensorId, EvalError> {
        let descriptor = Arc::new(descriptor);
        self.push_single(|out| AnyOperation::MaxPool(MaxPoolOperation::new(x, out, descriptor)))
    }

    pub fn batch_norm(&mut self, x: TensorId, scale: TensorId, bias: TensorId, mean: TensorId, var: TensorId, epsilon: f32) -> Result<TensorId, EvalError> {
        self.push_single(|out| AnyOperation::BatchNormalization(BatchNormalizationOperation::new(x, scale, bias, mean, var, out, epsilon)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_execute_eagerly() {
        let mut builder = GraphBuilder::new();
        let a = builder.input("a", NDArrayNumericTensor::from(vec![1.0f32, -2.0, 3.0])).unwrap();
        let b = builder.weight("b", NDArrayNumericTensor::from(vec![1.0f32, 1.0, 1.0]), true).unwrap();
        let sum = builder.add(a, b).unwrap();
        let out = builder.relu(sum).unwrap();
        assert_eq!(builder.value(out).unwrap().try_to_vec::<f32>().unwrap(), vec![2.0, 0.0, 4.0]);
        let graph = builder.finish();
        assert_eq!(graph.get_operations().len(), 2);
        assert_eq!(graph.get_tensor_info(out).unwrap().producer, Some(1));
        assert_eq!(graph.get_inputs(), &[a]);
    }

    #[test]
    fn outputs_cannot_be_produced_twice() {
        let mut builder = GraphBuilder::new();
        let a = builder.input("a", NDArrayNumericTensor::from(vec![1.0f32])).unwrap();
        let out = builder.relu(a).unwrap();
        let op = AnyOperation::Unary(UnaryOperation::new(a, out, WhichUnaryOperation::Neg));
        assert!(matches!(builder.push_operation(None, op), Err(EvalError::InvalidInput(_))));
    }

    #[test]
    fn duplicate_names_conflict() {
        let mut builder = GraphBuilder::new();
        builder.input("x", NDArrayNumericTensor::from(vec![1i64])).unwrap();
        assert!(matches!(
            builder.constant(Some("x"), NDArrayNumericTensor::from(vec![2i64])),
            Err(EvalError::NameConflict(_))
        ));
    }
}
