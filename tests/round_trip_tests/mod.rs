use std::collections::HashMap;
use std::sync::Once;

use onnx_bridge::dtype::DType;
use onnx_bridge::storage;
use onnx_bridge::{
    ExportOptions, GraphBuilder, ImportOptions, NDArrayNumericTensor, ReplayRunner, TensorId, export_graph, import_model_bytes,
    import_model_file,
};

pub mod arith;
pub mod logic;
pub mod shape;
pub mod spatial;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// How an exported model travels back to the importer.
pub enum Transport {
    Memory,
    File(tempfile::TempDir),
}

impl Transport {
    pub fn import(&self, model: &onnx_bridge::onnx::ModelProto, options: ImportOptions) -> ReplayRunner {
        match self {
            Transport::Memory => import_model_bytes(&storage::encode_model(model), options).unwrap(),
            Transport::File(dir) => {
                let path = dir.path().join("model.onnx");
                storage::save_model_file(model, &path).unwrap();
                import_model_file(&path, options).unwrap()
            }
        }
    }
}

fn test_eq(value: &NDArrayNumericTensor, correct: &NDArrayNumericTensor, atol: f64, rtol: f64) {
    assert_eq!(value.shape(), correct.shape());
    let value_vec: Vec<f64> = value.cast(DType::F64).try_to_vec().unwrap();
    let correct_vec: Vec<f64> = correct.cast(DType::F64).try_to_vec().unwrap();
    for i in 0..value_vec.len() {
        let a = value_vec[i];
        let b = correct_vec[i];
        let err = (a - b).abs();
        let limit = atol + rtol * (a.abs().max(b.abs()));
        assert!(err <= limit, "{a} != {b}: {err} > {limit}");
    }
}

pub fn test_eq_f32(value: &NDArrayNumericTensor, correct: &NDArrayNumericTensor) {
    assert_eq!(value.dtype(), DType::F32);
    assert_eq!(correct.dtype(), DType::F32);
    test_eq(value, correct, 1e-5, 1.3e-6);
}

pub fn test_eq_exact(value: &NDArrayNumericTensor, correct: &NDArrayNumericTensor) {
    assert_eq!(value.dtype(), correct.dtype());
    assert_eq!(value, correct);
}

pub fn f32_tensor(values: &[f32], shape: &[usize]) -> NDArrayNumericTensor {
    NDArrayNumericTensor::from_vec_shape(values.to_vec(), shape).unwrap()
}

/// Export `outputs`, re-import the model with the traced inputs injected,
/// replay it, and compare each output against the value seen while tracing.
pub fn check_round_trip(transport: &Transport, builder: GraphBuilder, outputs: &[(&str, TensorId)]) -> ReplayRunner {
    init_logger();
    let graph = builder.finish();
    let model = export_graph(&graph, outputs, &ExportOptions::default()).unwrap();

    let mut options = ImportOptions::default();
    let mut inputs = HashMap::new();
    for &id in graph.get_inputs() {
        let info = graph.get_tensor_info(id).unwrap();
        let name = info.name.clone().unwrap();
        let value = info.value.clone().unwrap();
        options = options.with_input(&name, value.clone());
        inputs.insert(name, value);
    }
    let mut runner = transport.import(&model, options);
    let declared = runner.input_names();
    inputs.retain(|name, _| declared.contains(name));
    let result = runner.run_named(inputs, None).unwrap();

    for (name, id) in outputs {
        let expected = graph.get_value(*id).unwrap();
        let actual = result.get(name).unwrap_or_else(|| panic!("missing output {name}"));
        if expected.dtype().is_float() {
            test_eq(actual, expected, 1e-5, 1e-5);
            assert_eq!(actual.dtype(), expected.dtype());
        } else {
            test_eq_exact(actual, expected);
        }
    }
    runner
}
