use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::ndarray_backend::NDArrayNumericTensor;

/// How declared graph inputs are materialized when the caller does not
/// inject a buffer for them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InputFill {
    Random { seed: u64 },
    Zeros,
}

impl Default for InputFill {
    fn default() -> Self {
        InputFill::Random { seed: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Return every tensor produced during a run instead of the declared outputs.
    pub return_intermediates: bool,
    pub training: bool,
    /// Seeds the generator behind Dropout masks.
    pub seed: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            return_intermediates: false,
            training: false,
            seed: 0,
        }
    }
}

impl RunnerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub input_fill: InputFill,
    /// Size given to symbolic (`dim_param`) dimensions of filled inputs.
    pub symbolic_dim_size: usize,
    pub runner: RunnerConfig,
    /// Caller-supplied buffers for declared inputs, by name.
    #[serde(skip)]
    pub inputs: HashMap<String, NDArrayNumericTensor>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            input_fill: InputFill::default(),
            symbolic_dim_size: 1,
            runner: RunnerConfig::default(),
            inputs: HashMap::new(),
        }
    }
}

impl ImportOptions {
    pub fn with_input(mut self, name: &str, value: NDArrayNumericTensor) -> Self {
        self.inputs.insert(name.to_string(), value);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub producer_name: String,
    pub producer_version: String,
    pub graph_name: String,
    pub doc_string: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            producer_name: env!("CARGO_PKG_NAME").to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            graph_name: "main".to_string(),
            doc_string: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_config_fills_missing_fields() {
        let config = RunnerConfig::from_json(r#"{"return_intermediates": true}"#).unwrap();
        assert!(config.return_intermediates);
        assert!(!config.training);
        assert_eq!(config.seed, 0);
    }

    #[test]
    fn input_fill_is_internally_tagged() {
        let options: ImportOptions = serde_json::from_str(r#"{"input_fill": {"kind": "Zeros"}, "symbolic_dim_size": 4}"#).unwrap();
        assert_eq!(options.input_fill, InputFill::Zeros);
        assert_eq!(options.symbolic_dim_size, 4);
    }
}
