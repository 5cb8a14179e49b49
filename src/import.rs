use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{ImportOptions, InputFill};
use crate::dtype::{DType, DTypeError};
use crate::eval_backend::EvalContext;
use crate::graph::builder::GraphBuilder;
use crate::graph::ops::{AnyOperation, EvalError, OnnxNode};
use crate::graph::registry::OpKind;
use crate::graph::{Dimension, ShapeMismatch, TensorRole, check_tensor_matches, known_dims, query_attribute_tensor};
use crate::model::{
    ML_DOMAIN, ModelError, ModelMetadata, SUPPORTED_DEFAULT_OPSET, SUPPORTED_IR_VERSION, SUPPORTED_ML_OPSET,
};
use crate::ndarray_backend::numeric_tensor::checked_num_elements;
use crate::ndarray_backend::{NDArrayNumericTensor, NDArrayNumericTensorError};
use crate::onnx;
use crate::runner::ReplayRunner;
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum ONNXDecodingError {
    #[error("Unsupported {what} version {found}")]
    UnsupportedVersion { what: String, found: String },
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("Invalid inputs for operator {0}")]
    InvalidOperatorInputs(String),
    #[error("Invalid outputs for operator {0}")]
    InvalidOperatorOutputs(String),
    #[error("Node \"{node}\" references undefined tensor \"{tensor}\"")]
    MissingDependency { node: String, tensor: String },
    #[error("Missing expected attribute \"{1}\" for op {0}")]
    MissingAttribute(String, String),
    #[error("Invalid attribute for op {0}: {1}")]
    InvalidAttribute(String, String),
    #[error("Missing field \"{0}\"")]
    MissingField(&'static str),
    #[error("Negative dimension in \"{0}\"")]
    NegativeDimension(String),
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatch),
    #[error(transparent)]
    UnsupportedDType(#[from] DTypeError),
    #[error(transparent)]
    NDArrayNumericTensorError(#[from] NDArrayNumericTensorError),
    #[error("Protobuf decoding error")]
    ProtobufDecodeError(#[from] anyhow::Error),
    #[error("Malformed model metadata")]
    MetadataError(#[from] serde_json::Error),
    #[error("Error evaluating node \"{node}\"")]
    NodeEvalError {
        node: String,
        #[source]
        source: EvalError,
    },
    #[error(transparent)]
    EvalError(#[from] EvalError),
}

/// Reject anything outside the supported version table before building
/// a single tensor.
pub fn check_versions(model: &onnx::ModelProto) -> Result<(), ONNXDecodingError> {
    if model.ir_version != SUPPORTED_IR_VERSION {
        return Err(ONNXDecodingError::UnsupportedVersion {
            what: "ir".to_string(),
            found: model.ir_version.to_string(),
        });
    }
    let mut default_opset = None;
    for opset in &model.opset_import {
        match opset.domain.as_str() {
            "" | "ai.onnx" => default_opset = Some(opset.version),
            ML_DOMAIN if opset.version == SUPPORTED_ML_OPSET => {}
            domain => {
                return Err(ONNXDecodingError::UnsupportedVersion {
                    what: format!("opset \"{domain}\""),
                    found: opset.version.to_string(),
                });
            }
        }
    }
    match default_opset {
        Some(SUPPORTED_DEFAULT_OPSET) => Ok(()),
        Some(version) => Err(ONNXDecodingError::UnsupportedVersion {
            what: "default opset".to_string(),
            found: version.to_string(),
        }),
        None => Err(ONNXDecodingError::UnsupportedVersion {
            what: "default opset".to_string(),
            found: "none".to_string(),
        }),
    }
}

/// Declared element type and shape. Either is `None` when the document
/// leaves it out.
fn parse_value_info(value_info: &onnx::ValueInfoProto) -> Result<(Option<DType>, Option<Vec<Dimension>>), ONNXDecodingError> {
    let Some(onnx::type_proto::Value::TensorType(tensor_type)) = value_info.r#type.as_ref().and_then(|t| t.value.as_ref()) else {
        return Ok((None, None));
    };
    let dtype = if tensor_type.elem_type == onnx::tensor_proto::DataType::Undefined as i32 {
        None
    } else {
        Some(DType::from_onnx_tag(tensor_type.elem_type)?)
    };
    let shape = match &tensor_type.shape {
        None => None,
        Some(shape) => {
            let mut dims = Vec::with_capacity(shape.dim.len());
            for (i, dim) in shape.dim.iter().enumerate() {
                dims.push(match &dim.value {
                    Some(onnx::tensor_shape_proto::dimension::Value::DimValue(x)) => {
                        Dimension::Known(usize::try_from(*x).map_err(|_| ONNXDecodingError::NegativeDimension(value_info.name.clone()))?)
                    }
                    Some(onnx::tensor_shape_proto::dimension::Value::DimParam(x)) => Dimension::Symbolic(x.clone()),
                    None => Dimension::Symbolic(format!("{}_dim_{i}", value_info.name)),
                });
            }
            Some(dims)
        }
    };
    Ok((dtype, shape))
}

/// Rebuild the graph described by `model`, executing each node as it is
/// added, and wrap it for replay.
pub fn import_model(model: &onnx::ModelProto, options: ImportOptions) -> Result<ReplayRunner, ONNXDecodingError> {
    check_versions(model)?;
    let graph_proto = model.graph.as_ref().ok_or(ONNXDecodingError::MissingField("graph"))?;
    let metadata = ModelMetadata::from_model(model)?.unwrap_or_default();
    log::info!(
        "Importing ONNX graph \"{}\": {} nodes, {} initializers",
        graph_proto.name,
        graph_proto.node.len(),
        graph_proto.initializer.len()
    );

    let mut ctx = EvalContext::new(options.runner.seed);
    ctx.training = options.runner.training;
    let mut builder = GraphBuilder::with_context(ctx);

    for initializer in &graph_proto.initializer {
        let value = NDArrayNumericTensor::try_from(initializer)?;
        let trainable = metadata.trainable.contains(&initializer.name);
        builder.weight(&initializer.name, value, trainable)?;
    }

    let mut fill_rng = match options.input_fill {
        InputFill::Random { seed } => Some(StdRng::seed_from_u64(seed)),
        InputFill::Zeros => None,
    };
    for input in &graph_proto.input {
        // Older exporters list initializers among the inputs too
        if builder.graph().get_tensor_by_name(&input.name).is_some() {
            continue;
        }
        let (dtype, shape) = parse_value_info(input)?;
        let dtype = dtype.ok_or(ONNXDecodingError::MissingField("input.type.tensor_type.elem_type"))?;
        let value = match options.inputs.get(&input.name) {
            Some(value) => {
                check_tensor_matches(&input.name, value, Some(dtype), shape.as_deref())?;
                value.clone()
            }
            None => {
                let declared = shape.as_ref().ok_or(ONNXDecodingError::MissingField("input.type.tensor_type.shape"))?;
                let concrete: Vec<usize> = declared
                    .iter()
                    .map(|d| match d {
                        Dimension::Known(x) => *x,
                        Dimension::Symbolic(_) => options.symbolic_dim_size,
                    })
                    .collect();
                checked_num_elements(&concrete)?;
                match &mut fill_rng {
                    Some(rng) => NDArrayNumericTensor::random(dtype, &concrete, rng)?,
                    None => NDArrayNumericTensor::zeros(dtype, &concrete),
                }
            }
        };
        let shape = shape.unwrap_or_else(|| known_dims(value.shape()));
        builder.declared_input(&input.name, dtype, shape, value)?;
    }
    for name in options.inputs.keys() {
        if !graph_proto.input.iter().any(|input| &input.name == name) {
            log::warn!("Injected input \"{name}\" is not a declared graph input");
        }
    }

    for (index, node) in graph_proto.node.iter().enumerate() {
        let node_name = if node.name.is_empty() {
            format!("{}_{index}", node.op_type)
        } else {
            node.name.clone()
        };
        if !(node.domain.is_empty() || node.domain == "ai.onnx") {
            return Err(ONNXDecodingError::UnsupportedOperator(format!("{}::{}", node.domain, node.op_type)));
        }
        let kind = OpKind::from_onnx_op_type(&node.op_type)
            .ok_or_else(|| ONNXDecodingError::UnsupportedOperator(node.op_type.clone()))?;

        if kind == OpKind::Constant {
            let value = query_attribute_tensor(&node.attribute, "value")
                .ok_or_else(|| ONNXDecodingError::MissingAttribute(node.op_type.clone(), "value".to_string()))?;
            let output = node
                .output
                .first()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| ONNXDecodingError::InvalidOperatorOutputs(node.op_type.clone()))?;
            builder.constant(Some(output), NDArrayNumericTensor::try_from(&value)?)?;
            continue;
        }

        let inputs = node
            .input
            .iter()
            .map(|name| {
                if name.is_empty() {
                    Ok(None)
                } else {
                    builder.graph().get_tensor_by_name(name).map(Some).ok_or_else(|| ONNXDecodingError::MissingDependency {
                        node: node_name.clone(),
                        tensor: name.clone(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = node
            .output
            .iter()
            .map(|name| if name.is_empty() { Ok(None) } else { builder.new_output(Some(name)).map(Some) })
            .collect::<Result<Vec<_>, _>>()?;

        let op = {
            let onnx_node = OnnxNode {
                proto: node,
                inputs,
                outputs,
                graph: builder.graph(),
            };
            AnyOperation::from_onnx(kind, &onnx_node)?
        };
        let name = (!node.name.is_empty()).then_some(node.name.as_str());
        builder
            .push_operation(name, op)
            .map_err(|source| ONNXDecodingError::NodeEvalError { node: node_name.clone(), source })?;
        log::debug!("Imported node \"{node_name}\" ({kind})");
    }

    for output in &graph_proto.output {
        let id = builder.graph().get_tensor_by_name(&output.name).ok_or_else(|| ONNXDecodingError::MissingDependency {
            node: "graph output".to_string(),
            tensor: output.name.clone(),
        })?;
        let (dtype, shape) = parse_value_info(output)?;
        let value = builder.graph().get_value(id).ok_or_else(|| ONNXDecodingError::MissingDependency {
            node: "graph output".to_string(),
            tensor: output.name.clone(),
        })?;
        check_tensor_matches(&output.name, value, dtype, shape.as_deref())?;
        let graph = builder.graph_mut();
        let info = graph.tensor_mut(id)?;
        if !info.is_leaf() {
            info.role = TensorRole::Output;
            if let Some(shape) = shape {
                info.shape = Some(shape);
            }
        }
        graph.declare_output(&output.name, id);
    }

    let (graph, ctx) = builder.into_parts();
    log::info!("Imported {} operations", graph.get_operations().len());
    Ok(ReplayRunner::new(graph, ctx, options.runner))
}

pub fn import_model_bytes(bytes: &[u8], options: ImportOptions) -> Result<ReplayRunner, ModelError> {
    let model = storage::decode_model(bytes)?;
    Ok(import_model(&model, options)?)
}

pub fn import_model_file(path: impl AsRef<Path>, options: ImportOptions) -> Result<ReplayRunner, ModelError> {
    let model = storage::load_model_file(path)?;
    Ok(import_model(&model, options)?)
}
