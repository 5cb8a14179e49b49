use crate::graph::{GraphOperation, OperationId, TensorId, TensorInfo};
use crate::ndarray_backend::NDArrayNumericTensor;

/// Hooks into a replay. Both callbacks fire in execution order.
pub trait RunObserver {
    fn on_op_executed(&mut self, op_id: OperationId, op: &GraphOperation);
    fn on_tensor_assigned(&mut self, tensor_id: TensorId, info: &TensorInfo, tensor: &NDArrayNumericTensor);
}

impl RunObserver for () {
    fn on_op_executed(&mut self, _op_id: OperationId, _op: &GraphOperation) {}
    fn on_tensor_assigned(&mut self, _tensor_id: TensorId, _info: &TensorInfo, _tensor: &NDArrayNumericTensor) {}
}
