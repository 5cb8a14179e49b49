use std::collections::{HashMap, HashSet};

use crate::config::ExportOptions;
use crate::dtype::DType;
use crate::graph::ops::{OnnxSlot, Operation};
use crate::graph::{Dimension, Graph, OperationId, TensorId, TensorInfo, known_dims, make_attribute_int, make_attribute_tensor};
use crate::model::{ML_DOMAIN, ModelMetadata, SUPPORTED_DEFAULT_OPSET, SUPPORTED_IR_VERSION, SUPPORTED_ML_OPSET};
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Debug, thiserror::Error)]
pub enum ONNXEncodingError {
    #[error("Operator {0} has no ONNX opset 11 equivalent")]
    UnsupportedOperator(String),
    #[error("Tensor name \"{0}\" is used twice")]
    NameConflict(String),
    #[error("Unknown tensor {0}")]
    UnknownTensor(String),
    #[error("Tensor \"{0}\" has no value or type to serialize")]
    MissingValue(String),
    #[error("Failed to encode model metadata")]
    MetadataError(#[from] serde_json::Error),
}

enum Visit {
    Tensor(TensorId),
    Emit(OperationId),
}

/// Operators reachable from `outputs` in producer-before-consumer order,
/// and the leaf tensors they read, in first-use order.
fn collect_subgraph(graph: &Graph, outputs: &[TensorId]) -> Result<(Vec<OperationId>, Vec<TensorId>), ONNXEncodingError> {
    let mut order = Vec::new();
    let mut leaves = Vec::new();
    let mut expanded = HashSet::new();
    let mut seen_leaves = HashSet::new();
    let mut stack: Vec<Visit> = outputs.iter().rev().map(|&id| Visit::Tensor(id)).collect();
    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Emit(op_id) => order.push(op_id),
            Visit::Tensor(id) => {
                let info = graph.get_tensor_info(id).ok_or_else(|| ONNXEncodingError::UnknownTensor(format!("#{id}")))?;
                match info.producer {
                    None => {
                        if seen_leaves.insert(id) {
                            leaves.push(id);
                        }
                    }
                    Some(op_id) => {
                        if expanded.insert(op_id) {
                            let op = &graph.get_operations()[op_id];
                            stack.push(Visit::Emit(op_id));
                            stack.extend(op.op.get_inputs().into_iter().rev().map(Visit::Tensor));
                        }
                    }
                }
            }
        }
    }
    Ok((order, leaves))
}

struct Names {
    assigned: HashMap<TensorId, String>,
    taken: HashSet<String>,
    next: usize,
}

impl Names {
    fn claim(&mut self, id: TensorId, name: &str) -> Result<(), ONNXEncodingError> {
        if !self.taken.insert(name.to_string()) {
            return Err(ONNXEncodingError::NameConflict(name.to_string()));
        }
        self.assigned.insert(id, name.to_string());
        Ok(())
    }

    fn fresh(&mut self, graph: &Graph) -> String {
        loop {
            let name = format!("tensor_{}", self.next);
            self.next += 1;
            if !self.taken.contains(&name) && graph.get_tensor_by_name(&name).is_none() {
                self.taken.insert(name.clone());
                return name;
            }
        }
    }

    fn get(&self, id: TensorId) -> &str {
        &self.assigned[&id]
    }
}

fn tensor_type(dtype: DType, as_bool: bool) -> onnx::tensor_proto::DataType {
    if as_bool && dtype == DType::U8 {
        onnx::tensor_proto::DataType::Bool
    } else {
        onnx::tensor_proto::DataType::from(dtype)
    }
}

fn make_value_info(name: &str, info: &TensorInfo, as_bool: bool) -> Result<onnx::ValueInfoProto, ONNXEncodingError> {
    let dtype = info
        .dtype
        .or_else(|| info.value.as_ref().map(|v| v.dtype()))
        .ok_or_else(|| ONNXEncodingError::MissingValue(name.to_string()))?;
    let shape = info.shape.clone().or_else(|| info.value.as_ref().map(|v| known_dims(v.shape())));
    let shape = shape.map(|dims| onnx::TensorShapeProto {
        dim: dims
            .into_iter()
            .map(|d| onnx::tensor_shape_proto::Dimension {
                value: Some(match d {
                    Dimension::Known(x) => onnx::tensor_shape_proto::dimension::Value::DimValue(x as i64),
                    Dimension::Symbolic(x) => onnx::tensor_shape_proto::dimension::Value::DimParam(x),
                }),
                ..Default::default()
            })
            .collect(),
    });
    Ok(onnx::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(onnx::TypeProto {
            value: Some(onnx::type_proto::Value::TensorType(onnx::type_proto::Tensor {
                elem_type: tensor_type(dtype, as_bool) as i32,
                shape,
            })),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn make_node(op_type: &str, name: String, inputs: Vec<String>, outputs: Vec<String>, attribute: Vec<onnx::AttributeProto>) -> onnx::NodeProto {
    onnx::NodeProto {
        input: inputs,
        output: outputs,
        name,
        op_type: op_type.to_string(),
        attribute,
        ..Default::default()
    }
}

/// Serialize the part of `graph` that `outputs` depend on. Each output is
/// published under its requested name.
pub fn export_graph<S: AsRef<str>>(graph: &Graph, outputs: &[(S, TensorId)], options: &ExportOptions) -> Result<onnx::ModelProto, ONNXEncodingError> {
    let output_ids: Vec<TensorId> = outputs.iter().map(|(_, id)| *id).collect();
    let (order, leaves) = collect_subgraph(graph, &output_ids)?;
    log::debug!("Exporting {} operations reading {} leaf tensors", order.len(), leaves.len());

    let info = |id: TensorId| graph.get_tensor_info(id).ok_or_else(|| ONNXEncodingError::UnknownTensor(format!("#{id}")));

    let mut names = Names {
        assigned: HashMap::new(),
        taken: HashSet::new(),
        next: 0,
    };
    // Leaves and repeated requests keep their own name and get an Identity,
    // unless a leaf is requested under the name it already has
    let mut aliased_outputs = Vec::new();
    for (name, id) in outputs {
        let name = name.as_ref();
        let tensor = info(*id)?;
        let direct = !tensor.is_leaf() || tensor.name.as_deref() == Some(name);
        if direct && !names.assigned.contains_key(id) {
            names.claim(*id, name)?;
        } else {
            if !names.taken.insert(name.to_string()) {
                return Err(ONNXEncodingError::NameConflict(name.to_string()));
            }
            aliased_outputs.push((name.to_string(), *id));
        }
    }
    let mut reachable: Vec<TensorId> = leaves.clone();
    for &op_id in &order {
        reachable.extend(graph.get_operations()[op_id].op.get_outputs());
    }
    for &id in &reachable {
        if names.assigned.contains_key(&id) {
            continue;
        }
        if let Some(name) = &info(id)?.name {
            names.claim(id, name)?;
        }
    }
    for &id in &reachable {
        if !names.assigned.contains_key(&id) {
            let name = names.fresh(graph);
            names.assigned.insert(id, name);
        }
    }

    // Which tensors travel as ONNX BOOL
    let mut is_bool: HashSet<TensorId> = HashSet::new();
    for &op_id in &order {
        let op = &graph.get_operations()[op_id].op;
        for (input, slot) in op.get_inputs().into_iter().zip(op.get_onnx_input_slots()) {
            let input_info = info(input)?;
            if slot == OnnxSlot::Bool && input_info.is_leaf() && input_info.dtype == Some(DType::U8) {
                is_bool.insert(input);
            }
        }
    }

    let mut nodes = Vec::new();
    let mut casts: HashMap<(TensorId, bool), String> = HashMap::new();
    for &op_id in &order {
        let graph_op = &graph.get_operations()[op_id];
        let op = &graph_op.op;
        let kind = op.get_op_kind();
        let op_type = kind.onnx_op_type().ok_or_else(|| ONNXEncodingError::UnsupportedOperator(kind.to_string()))?;

        let inputs = op.get_inputs();
        let slots = op.get_onnx_input_slots();
        let passthrough: Vec<TensorId> = inputs
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| **slot == OnnxSlot::Passthrough)
            .map(|(id, _)| *id)
            .collect();
        let passthrough_bool = !passthrough.is_empty() && passthrough.iter().all(|id| is_bool.contains(id));

        let mut input_names = Vec::with_capacity(inputs.len());
        for (input, slot) in inputs.iter().zip(&slots) {
            let have = is_bool.contains(input);
            let want = match slot {
                OnnxSlot::Numeric => false,
                OnnxSlot::Bool => true,
                OnnxSlot::Passthrough => passthrough_bool,
                OnnxSlot::Any => have,
            };
            if have == want {
                input_names.push(names.get(*input).to_string());
                continue;
            }
            let cast_name = match casts.get(&(*input, want)) {
                Some(name) => name.clone(),
                None => {
                    let cast_name = names.fresh(graph);
                    let to = if want {
                        onnx::tensor_proto::DataType::Bool
                    } else {
                        onnx::tensor_proto::DataType::Uint8
                    };
                    nodes.push(make_node(
                        "Cast",
                        String::new(),
                        vec![names.get(*input).to_string()],
                        vec![cast_name.clone()],
                        vec![make_attribute_int("to", to as i64)],
                    ));
                    casts.insert((*input, want), cast_name.clone());
                    cast_name
                }
            };
            input_names.push(cast_name);
        }
        for constant in op.get_onnx_constant_inputs() {
            let constant_name = names.fresh(graph);
            let value = NDArrayNumericTensor::from(constant).to_tensor_proto(&constant_name, false);
            nodes.push(make_node(
                "Constant",
                String::new(),
                vec![],
                vec![constant_name.clone()],
                vec![make_attribute_tensor("value", value)],
            ));
            input_names.push(constant_name);
        }

        let outputs = op.get_outputs();
        for (output, flag) in outputs.iter().zip(op.get_onnx_bool_outputs()) {
            if flag || passthrough_bool {
                is_bool.insert(*output);
            }
        }
        let output_names = outputs.iter().map(|id| names.get(*id).to_string()).collect();
        nodes.push(make_node(
            op_type,
            graph_op.name.clone().unwrap_or_default(),
            input_names,
            output_names,
            op.get_onnx_attributes(),
        ));
    }
    for (name, id) in &aliased_outputs {
        nodes.push(make_node("Identity", String::new(), vec![names.get(*id).to_string()], vec![name.clone()], vec![]));
    }

    let mut initializers = Vec::new();
    let mut graph_inputs = Vec::new();
    let mut trainable = Vec::new();
    for &id in &leaves {
        let leaf = info(id)?;
        let name = names.get(id);
        if leaf.is_initializer() {
            let value = leaf.value.as_ref().ok_or_else(|| ONNXEncodingError::MissingValue(name.to_string()))?;
            initializers.push(value.to_tensor_proto(name, is_bool.contains(&id)));
            if leaf.trainable {
                trainable.push(name.to_string());
            }
        } else {
            graph_inputs.push(make_value_info(name, leaf, is_bool.contains(&id))?);
        }
    }

    let mut graph_outputs = Vec::new();
    for (name, id) in outputs {
        graph_outputs.push(make_value_info(name.as_ref(), info(*id)?, is_bool.contains(id))?);
    }

    let metadata = ModelMetadata {
        trainable,
        exporter_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    log::info!(
        "Exported graph \"{}\": {} nodes, {} initializers, {} inputs",
        options.graph_name,
        nodes.len(),
        initializers.len(),
        graph_inputs.len()
    );
    Ok(onnx::ModelProto {
        ir_version: SUPPORTED_IR_VERSION,
        opset_import: vec![
            onnx::OperatorSetIdProto {
                domain: String::new(),
                version: SUPPORTED_DEFAULT_OPSET,
            },
            onnx::OperatorSetIdProto {
                domain: ML_DOMAIN.to_string(),
                version: SUPPORTED_ML_OPSET,
            },
        ],
        producer_name: options.producer_name.clone(),
        producer_version: options.producer_version.clone(),
        doc_string: options.doc_string.clone(),
        graph: Some(onnx::GraphProto {
            node: nodes,
            name: options.graph_name.clone(),
            initializer: initializers,
            input: graph_inputs,
            output: graph_outputs,
            ..Default::default()
        }),
        metadata_props: vec![metadata.to_entry()?],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;

    #[test]
    fn shared_subexpressions_are_emitted_once() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", NDArrayNumericTensor::from(vec![1.0f32, 2.0])).unwrap();
        let y = builder.relu(x).unwrap();
        let a = builder.exp(y).unwrap();
        let b = builder.neg(y).unwrap();
        let z = builder.add(a, b).unwrap();
        let graph = builder.finish();
        let (order, leaves) = collect_subgraph(&graph, &[z]).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order.first(), Some(&0));
        assert_eq!(order.last(), Some(&3));
        assert_eq!(leaves, vec![x]);
    }

    #[test]
    fn unrequested_branches_are_dropped() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", NDArrayNumericTensor::from(vec![1.0f32])).unwrap();
        let kept = builder.relu(x).unwrap();
        builder.sigmoid(x).unwrap();
        let graph = builder.finish();
        let model = export_graph(&graph, &[("y", kept)], &ExportOptions::default()).unwrap();
        let graph_proto = model.graph.unwrap();
        assert_eq!(graph_proto.node.len(), 1);
        assert_eq!(graph_proto.node[0].op_type, "Relu");
        assert_eq!(graph_proto.node[0].output, vec!["y".to_string()]);
    }

    #[test]
    fn duplicate_output_names_conflict() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", NDArrayNumericTensor::from(vec![1.0f32])).unwrap();
        let a = builder.relu(x).unwrap();
        let b = builder.neg(x).unwrap();
        let graph = builder.finish();
        assert!(matches!(
            export_graph(&graph, &[("y", a), ("y", b)], &ExportOptions::default()),
            Err(ONNXEncodingError::NameConflict(_))
        ));
    }
}
