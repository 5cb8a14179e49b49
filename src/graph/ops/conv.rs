use std::sync::Arc;

use crate::eval_backend::EvalContext;
use crate::graph::ops::{EvalError, OnnxNode, Operation};
use crate::graph::registry::OpKind;
use crate::graph::{
    TensorId, make_attribute_int, make_attribute_ints, make_attribute_string, query_attribute_int, query_attribute_ints,
    query_attribute_string,
};
use crate::import::ONNXDecodingError;
use crate::ndarray_backend::NDArrayNumericTensor;
use crate::ndarray_backend::ops::{AutoPad, Window2d};
use crate::onnx;

/// Validated 2-D window geometry plus channel grouping. Built once when
/// the operation is created and shared by every later evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvDescriptor {
    window: Window2d,
    group: usize,
}

fn positive_pair(values: Option<&[i64]>, what: &str) -> Result<[usize; 2], EvalError> {
    match values {
        None => Ok([1, 1]),
        Some(&[a, b]) if a > 0 && b > 0 => Ok([a as usize, b as usize]),
        Some(other) => Err(EvalError::InvalidAttribute(format!("{what} {other:?}"))),
    }
}

impl ConvDescriptor {
    /// `pads` uses ONNX order: both begins, then both ends.
    pub fn new(kernel_shape: &[i64], strides: Option<&[i64]>, pads: Option<&[i64]>, dilations: Option<&[i64]>, group: i64) -> Result<Self, EvalError> {
        let kernel = match kernel_shape {
            &[h, w] if h > 0 && w > 0 => [h as usize, w as usize],
            other => return Err(EvalError::InvalidAttribute(format!("kernel_shape {other:?}"))),
        };
        let pads = match pads {
            None => [0; 4],
            Some(&[t, l, b, r]) if [t, l, b, r].iter().all(|&p| p >= 0) => [t as usize, l as usize, b as usize, r as usize],
            Some(other) => return Err(EvalError::InvalidAttribute(format!("pads {other:?}"))),
        };
        if group < 1 {
            return Err(EvalError::InvalidAttribute(format!("group {group}")));
        }
        Ok(Self {
            window: Window2d {
                kernel,
                strides: positive_pair(strides, "strides")?,
                pads,
                dilations: positive_pair(dilations, "dilations")?,
                auto_pad: AutoPad::NotSet,
            },
            group: group as usize,
        })
    }

    /// Switch padding mode. `Valid` clears any explicit pads; the SAME
    /// modes take their pads from the input size at evaluation time.
    pub fn with_auto_pad(mut self, auto_pad: AutoPad) -> Self {
        if auto_pad == AutoPad::Valid {
            self.window.pads = [0; 4];
        }
        self.window.auto_pad = auto_pad;
        self
    }

    pub fn auto_pad(&self) -> AutoPad {
        self.window.auto_pad
    }

    pub fn kernel_shape(&self) -> [usize; 2] {
        self.window.kernel
    }

    pub fn group(&self) -> usize {
        self.group
    }

    fn to_attributes(&self, with_group: bool) -> Vec<onnx::AttributeProto> {
        let ints = |values: &[usize]| values.iter().map(|&v| v as i64).collect::<Vec<_>>();
        let mut attributes = vec![
            make_attribute_ints("kernel_shape", &ints(&self.window.kernel)),
            make_attribute_ints("strides", &ints(&self.window.strides)),
            make_attribute_ints("dilations", &ints(&self.window.dilations)),
        ];
        if self.window.auto_pad.is_same() {
            attributes.push(make_attribute_string("auto_pad", self.window.auto_pad.onnx_name()));
        } else {
            attributes.push(make_attribute_ints("pads", &ints(&self.window.pads)));
        }
        if with_group {
            attributes.push(make_attribute_int("group", self.group as i64));
        }
        attributes
    }

    /// Read window attributes off a Conv or MaxPool node.
    fn from_node(node: &OnnxNode, kernel_shape: &[i64], group: i64) -> Result<Self, ONNXDecodingError> {
        let attributes = node.attributes();
        let invalid = |detail: String| ONNXDecodingError::InvalidAttribute(node.proto.op_type.clone(), detail);
        let auto_pad = match query_attribute_string(attributes, "auto_pad") {
            None => AutoPad::NotSet,
            Some(name) => AutoPad::from_onnx_name(&name).ok_or_else(|| invalid(format!("auto_pad {name}")))?,
        };
        let pads = match auto_pad {
            AutoPad::NotSet => query_attribute_ints(attributes, "pads"),
            _ => None,
        };
        let descriptor = Self::new(
            kernel_shape,
            query_attribute_ints(attributes, "strides").as_deref(),
            pads.as_deref(),
            query_attribute_ints(attributes, "dilations").as_deref(),
            group,
        )
        .map_err(|err| invalid(err.to_string()))?;
        Ok(descriptor.with_auto_pad(auto_pad))
    }
}

/// 2-D convolution over NCHW input with an optional per-channel bias.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvOperation {
    input: TensorId,
    weight: TensorId,
    bias: Option<TensorId>,
    output: TensorId,
    descriptor: Arc<ConvDescriptor>,
}

impl ConvOperation {
    pub fn new(input: TensorId, weight: TensorId, bias: Option<TensorId>, output: TensorId, descriptor: Arc<ConvDescriptor>) -> Self {
        Self { input, weight, bias, output, descriptor }
    }

    pub fn descriptor(&self) -> &Arc<ConvDescriptor> {
        &self.descriptor
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() < 2 || node.inputs.len() > 3 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("Conv".to_string()));
        }
        let input = node.input(0)?;
        let weight = node.input(1)?;
        let kernel_shape = match query_attribute_ints(node.attributes(), "kernel_shape") {
            Some(kernel_shape) => kernel_shape,
            None => {
                let weight_shape = node.graph.get_value(weight).map(|v| v.shape().to_vec());
                let weight_shape = node.require_attribute(weight_shape, "kernel_shape")?;
                weight_shape.iter().skip(2).map(|&d| d as i64).collect()
            }
        };
        let group = query_attribute_int(node.attributes(), "group").unwrap_or(1);
        let descriptor = ConvDescriptor::from_node(node, &kernel_shape, group)?;
        Ok(Self::new(input, weight, node.optional_input(2), node.output(0)?, Arc::new(descriptor)))
    }
}

impl Operation for ConvOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::Conv
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        let mut inputs = vec![self.input, self.weight];
        inputs.extend(self.bias);
        inputs
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        let bias = inputs.get(2).copied();
        Ok(vec![inputs[0].conv2d(inputs[1], bias, &self.descriptor.window, self.descriptor.group)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        self.descriptor.to_attributes(true)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaxPoolOperation {
    input: TensorId,
    output: TensorId,
    descriptor: Arc<ConvDescriptor>,
}

impl MaxPoolOperation {
    pub fn new(input: TensorId, output: TensorId, descriptor: Arc<ConvDescriptor>) -> Self {
        Self { input, output, descriptor }
    }

    pub(crate) fn from_onnx(node: &OnnxNode) -> Result<Self, ONNXDecodingError> {
        if node.inputs.len() != 1 {
            return Err(ONNXDecodingError::InvalidOperatorInputs("MaxPool".to_string()));
        }
        if node.optional_output(1).is_some() {
            return Err(ONNXDecodingError::InvalidOperatorOutputs("MaxPool".to_string()));
        }
        if query_attribute_int(node.attributes(), "ceil_mode").unwrap_or(0) != 0 {
            return Err(ONNXDecodingError::InvalidAttribute("MaxPool".to_string(), "ceil_mode 1".to_string()));
        }
        let input = node.input(0)?;
        let kernel_shape = node.require_attribute(query_attribute_ints(node.attributes(), "kernel_shape"), "kernel_shape")?;
        let descriptor = ConvDescriptor::from_node(node, &kernel_shape, 1)?;
        Ok(Self::new(input, node.output(0)?, Arc::new(descriptor)))
    }
}

impl Operation for MaxPoolOperation {
    fn get_op_kind(&self) -> OpKind {
        OpKind::MaxPool
    }

    fn get_inputs(&self) -> Vec<TensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TensorId> {
        vec![self.output]
    }

    fn eval(&self, _ctx: &mut EvalContext, inputs: &[&NDArrayNumericTensor]) -> Result<Vec<NDArrayNumericTensor>, EvalError> {
        Ok(vec![inputs[0].max_pool2d(&self.descriptor.window)?])
    }

    fn get_onnx_attributes(&self) -> Vec<onnx::AttributeProto> {
        self.descriptor.to_attributes(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_and_validation() {
        let descriptor = ConvDescriptor::new(&[3, 3], None, None, None, 1).unwrap();
        assert_eq!(descriptor.window.strides, [1, 1]);
        assert_eq!(descriptor.window.pads, [0; 4]);
        assert!(ConvDescriptor::new(&[3], None, None, None, 1).is_err());
        assert!(ConvDescriptor::new(&[3, 3], Some(&[0, 1]), None, None, 1).is_err());
        assert!(ConvDescriptor::new(&[3, 3], None, Some(&[1, -1, 1, 1]), None, 1).is_err());
        assert!(ConvDescriptor::new(&[3, 3], None, None, None, 0).is_err());
    }

    #[test]
    fn same_padding_exports_auto_pad_instead_of_pads() {
        let descriptor = ConvDescriptor::new(&[3, 3], Some(&[2, 2][..]), None, None, 1).unwrap().with_auto_pad(AutoPad::SameLower);
        let attributes = descriptor.to_attributes(false);
        assert_eq!(query_attribute_string(&attributes, "auto_pad").as_deref(), Some("SAME_LOWER"));
        assert!(query_attribute_ints(&attributes, "pads").is_none());

        let explicit = ConvDescriptor::new(&[3, 3], None, Some(&[1, 1, 1, 1][..]), None, 1).unwrap();
        let attributes = explicit.to_attributes(true);
        assert!(query_attribute_string(&attributes, "auto_pad").is_none());
        assert_eq!(query_attribute_ints(&attributes, "pads"), Some(vec![1, 1, 1, 1]));

        let valid = explicit.with_auto_pad(AutoPad::Valid);
        assert_eq!(query_attribute_ints(&valid.to_attributes(false), "pads"), Some(vec![0, 0, 0, 0]));
    }
}
