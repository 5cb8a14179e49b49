use std::collections::HashMap;

use crate::config::{ExportOptions, RunnerConfig};
use crate::eval_backend::EvalContext;
use crate::export::{ONNXEncodingError, export_graph};
use crate::graph::observer::RunObserver;
use crate::graph::ops::EvalError;
use crate::graph::{Graph, ShapeMismatch, TensorId, TensorInfo, check_tensor_matches};
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::onnx;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Expected {expected} inputs, got {found}")]
    InputCount { expected: usize, found: usize },
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatch),
    #[error("Cutoff {cutoff} is out of range for {len} operations")]
    InvalidCutoff { cutoff: isize, len: usize },
    #[error("Unknown tensor \"{0}\"")]
    UnknownTensor(String),
    #[error("Error executing operation \"{op}\"")]
    Eval {
        op: String,
        #[source]
        source: EvalError,
    },
}

/// Named tensors handed back from a run, in a stable order.
#[derive(Clone, Debug, Default)]
pub struct RunOutputs {
    pub outputs: Vec<(String, NDArrayNumericTensor)>,
    /// Number of operators executed.
    pub executed: usize,
}

impl RunOutputs {
    pub fn get(&self, name: &str) -> Option<&NDArrayNumericTensor> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Forward executor for an imported (or traced) graph. Values are updated
/// in place, so after a truncated run the tensors past the cutoff still
/// hold whatever the previous run left there.
#[derive(Debug)]
pub struct ReplayRunner {
    graph: Graph,
    ctx: EvalContext,
    config: RunnerConfig,
}

impl ReplayRunner {
    pub(crate) fn new(graph: Graph, mut ctx: EvalContext, config: RunnerConfig) -> Self {
        ctx.training = config.training;
        Self { graph, ctx, config }
    }

    pub fn from_graph(graph: Graph, config: RunnerConfig) -> Self {
        let ctx = EvalContext::new(config.seed);
        Self::new(graph, ctx, config)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn num_operations(&self) -> usize {
        self.graph.get_operations().len()
    }

    pub fn input_names(&self) -> Vec<String> {
        self.graph.get_inputs().iter().map(|&id| self.graph.tensor_display_name(id)).collect()
    }

    pub fn set_training(&mut self, training: bool) {
        self.config.training = training;
        self.ctx.training = training;
    }

    pub fn set_return_intermediates(&mut self, return_intermediates: bool) {
        self.config.return_intermediates = return_intermediates;
    }

    pub fn tensors(&self) -> impl Iterator<Item = (TensorId, &TensorInfo)> {
        self.graph.tensors()
    }

    pub fn tensor_by_name(&self, name: &str) -> Option<&TensorInfo> {
        self.graph.get_tensor_by_name(name).and_then(|id| self.graph.get_tensor_info(id))
    }

    pub fn set_trainable(&mut self, name: &str, trainable: bool) -> Result<(), ReplayError> {
        let id = self.graph.get_tensor_by_name(name).ok_or_else(|| ReplayError::UnknownTensor(name.to_string()))?;
        self.graph
            .tensor_mut(id)
            .map_err(|_| ReplayError::UnknownTensor(name.to_string()))?
            .trainable = trainable;
        Ok(())
    }

    /// Number of operators a cutoff selects. Negative values count back from the end.
    fn resolve_cutoff(&self, cutoff: Option<isize>) -> Result<usize, ReplayError> {
        let len = self.num_operations();
        let Some(cutoff) = cutoff else {
            return Ok(len);
        };
        let count = if cutoff >= 0 {
            Some(cutoff as usize).filter(|&n| n <= len)
        } else {
            len.checked_sub(cutoff.unsigned_abs())
        };
        count.ok_or(ReplayError::InvalidCutoff { cutoff, len })
    }

    /// Run with inputs in declared-input order.
    pub fn run(&mut self, inputs: Vec<NDArrayNumericTensor>, cutoff: Option<isize>) -> Result<RunOutputs, ReplayError> {
        let expected = self.graph.get_inputs().len();
        if inputs.len() != expected {
            return Err(ReplayError::InputCount { expected, found: inputs.len() });
        }
        let named = self.input_names().into_iter().zip(inputs).collect();
        self.run_named(named, cutoff)
    }

    /// Run with inputs matched by name. Declared inputs left out keep
    /// their current value.
    pub fn run_named(&mut self, inputs: HashMap<String, NDArrayNumericTensor>, cutoff: Option<isize>) -> Result<RunOutputs, ReplayError> {
        self.run_named_with_observer(inputs, cutoff, &mut ())
    }

    pub fn run_named_with_observer<O: RunObserver>(
        &mut self,
        inputs: HashMap<String, NDArrayNumericTensor>,
        cutoff: Option<isize>,
        observer: &mut O,
    ) -> Result<RunOutputs, ReplayError> {
        let count = self.resolve_cutoff(cutoff)?;

        let mut assignments = Vec::with_capacity(inputs.len());
        for (name, value) in inputs {
            let id = self
                .graph
                .get_tensor_by_name(&name)
                .filter(|id| self.graph.get_inputs().contains(id))
                .ok_or_else(|| ReplayError::UnknownTensor(name.clone()))?;
            let info = self.graph.get_tensor_info(id).ok_or_else(|| ReplayError::UnknownTensor(name.clone()))?;
            check_tensor_matches(&name, &value, info.dtype, info.shape.as_deref())?;
            assignments.push((id, value));
        }
        for (id, value) in assignments {
            if let Ok(info) = self.graph.tensor_mut(id) {
                info.value = Some(value);
            }
        }

        log::debug!("Replaying {count} of {} operations", self.num_operations());
        let mut produced = Vec::new();
        let mut last_outputs = Vec::new();
        for index in 0..count {
            let ids = self.graph.execute_operation(index, &mut self.ctx).map_err(|source| ReplayError::Eval {
                op: self.graph.get_operations()[index].display_name(),
                source,
            })?;
            observer.on_op_executed(index, &self.graph.get_operations()[index]);
            for &id in &ids {
                if let Some(info) = self.graph.get_tensor_info(id) {
                    if let Some(value) = &info.value {
                        observer.on_tensor_assigned(id, info, value);
                    }
                }
            }
            produced.extend(ids.iter().copied());
            last_outputs = ids;
        }

        let selected: Vec<(String, TensorId)> = if self.config.return_intermediates {
            produced.iter().map(|&id| (self.graph.tensor_display_name(id), id)).collect()
        } else if cutoff.is_some() {
            last_outputs.iter().map(|&id| (self.graph.tensor_display_name(id), id)).collect()
        } else {
            self.graph.get_outputs().to_vec()
        };
        let mut outputs = Vec::with_capacity(selected.len());
        for (name, id) in selected {
            let value = self.graph.get_value(id).ok_or_else(|| ReplayError::UnknownTensor(name.clone()))?;
            outputs.push((name, value.clone()));
        }
        Ok(RunOutputs { outputs, executed: count })
    }

    /// Re-export the graph. Without an explicit list the declared outputs are used.
    pub fn export(&self, outputs: Option<&[&str]>, options: &ExportOptions) -> Result<onnx::ModelProto, ONNXEncodingError> {
        match outputs {
            None => export_graph(&self.graph, self.graph.get_outputs(), options),
            Some(names) => {
                let resolved = names
                    .iter()
                    .map(|&name| {
                        self.graph
                            .get_tensor_by_name(name)
                            .map(|id| (name, id))
                            .ok_or_else(|| ONNXEncodingError::UnknownTensor(name.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                export_graph(&self.graph, &resolved, options)
            }
        }
    }
}
