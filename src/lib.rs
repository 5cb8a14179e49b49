pub mod config;
pub mod dtype;
pub mod eval_backend;
pub mod export;
pub mod graph;
pub mod import;
pub mod model;
pub mod ndarray_backend;
pub mod runner;
pub mod storage;

#[allow(clippy::all)]
pub mod onnx;

pub use config::{ExportOptions, ImportOptions, InputFill, RunnerConfig};
pub use dtype::DType;
pub use export::{ONNXEncodingError, export_graph};
pub use graph::builder::GraphBuilder;
pub use graph::ops::EvalError;
pub use graph::{Dimension, Graph, TensorId, TensorInfo, TensorRole};
pub use import::{ONNXDecodingError, import_model, import_model_bytes, import_model_file};
pub use model::{ModelError, ModelMetadata};
pub use ndarray_backend::NDArrayNumericTensor;
pub use runner::{ReplayError, ReplayRunner, RunOutputs};
