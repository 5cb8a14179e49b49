use std::ops::Add;
use ndarray::{concatenate, s, ArcArray, Array, Array3, Array4, ArrayViewD, Axis, Ix4, IxDyn, LinalgScalar, ShapeError, Slice, Zip};
use num_traits::{Float, Zero};

#[derive(Debug, thiserror::Error)]
pub enum NDArrayOperationError {
    #[error(transparent)]
    ShapeError(#[from] ShapeError),
    #[error("out of bounds")]
    OutOfBounds,
    #[error("incompatible shape")]
    IncompatibleShape,
    #[error("shape mismatch: {0}")]
    IncompatibleShapes(String),
    #[error("broadcast error: {0}")]
    BroadcastError(String),
}

/// Resolve a possibly negative ONNX axis against `rank`.
pub(crate) fn normalize_axis(axis: i64, rank: usize) -> Result<usize, NDArrayOperationError> {
    let rank = rank as i64;
    let axis = if axis < 0 { axis + rank } else { axis };
    if axis < 0 || axis >= rank {
        return Err(NDArrayOperationError::OutOfBounds);
    }
    Ok(axis as usize)
}

/// Numpy-style multidirectional broadcast of two shapes.
pub(crate) fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, NDArrayOperationError> {
    let rank = a.len().max(b.len());
    let offset_a = rank - a.len();
    let offset_b = rank - b.len();
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let da = if i >= offset_a { a[i - offset_a] } else { 1 };
        let db = if i >= offset_b { b[i - offset_b] } else { 1 };
        out.push(if da == db {
            da
        } else if da == 1 {
            db
        } else if db == 1 {
            da
        } else {
            return Err(NDArrayOperationError::BroadcastError(format!("{a:?} and {b:?}")));
        });
    }
    Ok(out)
}

fn broadcast_view<'a, T>(tensor: &'a ArcArray<T, IxDyn>, shape: &[usize]) -> Result<ArrayViewD<'a, T>, NDArrayOperationError> {
    tensor.broadcast(IxDyn(shape)).ok_or_else(|| {
        NDArrayOperationError::BroadcastError(format!("{:?} -> {:?}", tensor.shape(), shape))
    })
}

/// Elementwise map over two broadcast inputs.
pub(crate) fn binary_map<T, U, F>(
    a: &ArcArray<T, IxDyn>,
    b: &ArcArray<T, IxDyn>,
    f: F,
) -> Result<ArcArray<U, IxDyn>, NDArrayOperationError>
where
    F: Fn(&T, &T) -> U,
    U: Clone,
{
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    let av = broadcast_view(a, &shape)?;
    let bv = broadcast_view(b, &shape)?;
    Ok(Zip::from(av).and(bv).map_collect(|x, y| f(x, y)).into_shared())
}

/// ONNX Where: picks from `x` where `condition` is nonzero, else from `y`.
pub(crate) fn where_select<T: Clone>(
    condition: &ArcArray<u8, IxDyn>,
    x: &ArcArray<T, IxDyn>,
    y: &ArcArray<T, IxDyn>,
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let shape = broadcast_shapes(&broadcast_shapes(condition.shape(), x.shape())?, y.shape())?;
    let cv = broadcast_view(condition, &shape)?;
    let xv = broadcast_view(x, &shape)?;
    let yv = broadcast_view(y, &shape)?;
    Ok(Zip::from(cv)
        .and(xv)
        .and(yv)
        .map_collect(|c, x, y| if *c != 0 { x.clone() } else { y.clone() })
        .into_shared())
}

/// ONNX MatMul: numpy matmul semantics, including rank-1 promotion and
/// broadcasting over leading batch dimensions.
pub(crate) fn matmul<T: LinalgScalar>(
    a: &ArcArray<T, IxDyn>,
    b: &ArcArray<T, IxDyn>,
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return Err(NDArrayOperationError::IncompatibleShape);
    }
    let a_rank1 = a.ndim() == 1;
    let b_rank1 = b.ndim() == 1;
    let a = if a_rank1 { a.view().insert_axis(Axis(0)) } else { a.view() };
    let b = if b_rank1 { b.view().insert_axis(Axis(1)) } else { b.view() };

    let (m, k) = (a.shape()[a.ndim() - 2], a.shape()[a.ndim() - 1]);
    let (k2, n) = (b.shape()[b.ndim() - 2], b.shape()[b.ndim() - 1]);
    if k != k2 {
        return Err(NDArrayOperationError::IncompatibleShapes(format!(
            "matmul {:?} x {:?}",
            a.shape(),
            b.shape()
        )));
    }
    let batch = broadcast_shapes(&a.shape()[..a.ndim() - 2], &b.shape()[..b.ndim() - 2])?;
    let batch_size: usize = batch.iter().product();

    let mut a_shape = batch.clone();
    a_shape.extend([m, k]);
    let mut b_shape = batch.clone();
    b_shape.extend([k, n]);
    let a_b = a.broadcast(IxDyn(&a_shape)).ok_or(NDArrayOperationError::IncompatibleShape)?;
    let b_b = b.broadcast(IxDyn(&b_shape)).ok_or(NDArrayOperationError::IncompatibleShape)?;
    let a3 = Array3::from_shape_vec((batch_size, m, k), a_b.iter().cloned().collect())?;
    let b3 = Array3::from_shape_vec((batch_size, k, n), b_b.iter().cloned().collect())?;

    let mut out = Array3::<T>::zeros((batch_size, m, n));
    for i in 0..batch_size {
        let prod = a3.slice(s![i, .., ..]).dot(&b3.slice(s![i, .., ..]));
        out.slice_mut(s![i, .., ..]).assign(&prod);
    }

    let mut out_shape = batch;
    if !a_rank1 {
        out_shape.push(m);
    }
    if !b_rank1 {
        out_shape.push(n);
    }
    Ok(Array::from_shape_vec(IxDyn(&out_shape), out.iter().cloned().collect())?.into_shared())
}

pub(crate) fn reshape<T: Clone>(input: &ArcArray<T, IxDyn>, shape: &[usize]) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    Ok(Array::from_shape_vec(IxDyn(shape), input.iter().cloned().collect())?.into_shared())
}

/// Gather elements from `tensor` along axis `dim` according to `indices`.
/// Output shape = data.shape[..dim] ++ indices.shape ++ data.shape[dim+1..].
/// Negative indices count from the end of the axis.
pub(crate) fn gather<T: Clone>(
    dim: usize,
    tensor: &ArcArray<T, IxDyn>,
    indices: &ArcArray<i64, IxDyn>,
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let data_shape = tensor.shape();
    let rank = data_shape.len();
    if dim >= rank {
        return Err(NDArrayOperationError::OutOfBounds);
    }
    let axis_len = data_shape[dim];

    let idx_shape = indices.shape();
    let mut out_shape = Vec::with_capacity(rank - 1 + idx_shape.len());
    out_shape.extend(&data_shape[..dim]);
    out_shape.extend(idx_shape);
    out_shape.extend(&data_shape[dim + 1..]);
    let out_len = out_shape.iter().product::<usize>();

    // Row-major strides for the output
    let ndim = out_shape.len();
    let mut strides = vec![0; ndim];
    let mut stride = 1usize;
    for i in (0..ndim).rev() {
        strides[i] = stride;
        stride = stride
            .checked_mul(out_shape[i])
            .ok_or(NDArrayOperationError::OutOfBounds)?;
    }

    let mut out_buf = Vec::with_capacity(out_len);
    let mut idx_multi = Vec::with_capacity(ndim);
    let mut data_idx = Vec::with_capacity(rank);
    for flat in 0..out_len {
        idx_multi.clear();
        let mut rem = flat;
        for &st in &strides {
            idx_multi.push(rem / st);
            rem %= st;
        }

        let mut ix = indices[IxDyn(&idx_multi[dim..dim + idx_shape.len()])];
        if ix < 0 {
            ix += axis_len as i64;
        }
        if ix < 0 || ix >= axis_len as i64 {
            return Err(NDArrayOperationError::OutOfBounds);
        }

        data_idx.clear();
        data_idx.extend(&idx_multi[..dim]);
        data_idx.push(ix as usize);
        data_idx.extend(&idx_multi[dim + idx_shape.len()..]);
        out_buf.push(tensor[IxDyn(&data_idx)].clone());
    }

    Ok(Array::from_shape_vec(IxDyn(&out_shape), out_buf)?.into_shared())
}

/// Concatenate along `dim`; every input must agree on all other axes.
pub(crate) fn concat<T: Clone>(
    dim: usize,
    inputs: &[&ArcArray<T, IxDyn>],
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let first = inputs.first().ok_or(NDArrayOperationError::OutOfBounds)?;
    let rank = first.ndim();
    if dim >= rank {
        return Err(NDArrayOperationError::OutOfBounds);
    }
    for arr in inputs {
        if arr.ndim() != rank {
            return Err(NDArrayOperationError::IncompatibleShape);
        }
        for (d, &len) in arr.shape().iter().enumerate() {
            if d != dim && first.shape()[d] != len {
                return Err(NDArrayOperationError::IncompatibleShape);
            }
        }
    }
    let views: Vec<ArrayViewD<T>> = inputs.iter().map(|a| a.view()).collect();
    Ok(concatenate(Axis(dim), &views)?.into_shared())
}

/// Permute axes; `None` reverses them.
pub(crate) fn transpose<T: Clone>(
    tensor: &ArcArray<T, IxDyn>,
    perm: Option<&[i64]>,
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let rank = tensor.ndim();
    let axes: Vec<usize> = if let Some(p) = perm {
        if p.len() != rank {
            return Err(NDArrayOperationError::IncompatibleShape);
        }
        p.iter()
            .map(|&x| normalize_axis(x, rank))
            .collect::<Result<_, _>>()?
    } else {
        (0..rank).rev().collect()
    };

    let mut sorted = axes.clone();
    sorted.sort_unstable();
    if sorted != (0..rank).collect::<Vec<_>>() {
        return Err(NDArrayOperationError::IncompatibleShape);
    }

    Ok(tensor.clone().permuted_axes(axes))
}

/// Translate one ONNX Slice axis spec into an ndarray `Slice`, applying
/// the ONNX clamping rules for both step directions.
pub(crate) fn onnx_slice_spec(dim: usize, start: i64, end: i64, step: i64) -> Result<Slice, NDArrayOperationError> {
    if step == 0 {
        return Err(NDArrayOperationError::IncompatibleShapes("slice step of zero".to_string()));
    }
    if dim == 0 {
        return Ok(Slice::new(0, Some(0), 1));
    }
    let d = dim as i64;
    let start = if start < 0 { start.saturating_add(d) } else { start };
    let end = if end < 0 { end.saturating_add(d) } else { end };
    if step > 0 {
        let start = start.clamp(0, d);
        let end = end.clamp(0, d).max(start);
        Ok(Slice::new(start as isize, Some(end as isize), step as isize))
    } else {
        let start = start.clamp(0, d - 1);
        let end = end.clamp(-1, d - 1);
        if start <= end {
            return Ok(Slice::new(0, Some(0), 1));
        }
        // ndarray walks a negative step from the top of the half-open range
        Ok(Slice::new((end + 1) as isize, Some((start + 1) as isize), step as isize))
    }
}

pub(crate) fn slice_axes<T: Clone>(tensor: &ArcArray<T, IxDyn>, slices: &[Option<Slice>]) -> ArcArray<T, IxDyn> {
    tensor
        .slice_each_axis(|ax| slices[ax.axis.index()].unwrap_or(Slice::from(..)))
        .to_owned()
        .into_shared()
}

pub(crate) fn expand<T: Clone>(tensor: &ArcArray<T, IxDyn>, shape: &[usize]) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let out_shape = broadcast_shapes(tensor.shape(), shape)?;
    Ok(broadcast_view(tensor, &out_shape)?.to_owned().into_shared())
}

pub(crate) fn reduce_sum<T>(tensor: &ArcArray<T, IxDyn>, axes: &[usize], keepdims: bool) -> ArcArray<T, IxDyn>
where
    T: Clone + Zero + Add<Output = T>,
{
    let mut axes = axes.to_vec();
    axes.sort_unstable();
    axes.dedup();
    let mut out = tensor.to_owned();
    // Highest axis first so lower indices stay valid
    for &ax in axes.iter().rev() {
        out = out.sum_axis(Axis(ax));
        if keepdims {
            out = out.insert_axis(Axis(ax));
        }
    }
    out.into_shared()
}

/// Numerically stable softmax over every lane along `axis`.
pub(crate) fn softmax_lanes<T: Float>(tensor: &ArcArray<T, IxDyn>, axis: usize) -> ArcArray<T, IxDyn> {
    let mut out = tensor.to_owned();
    for mut lane in out.lanes_mut(Axis(axis)) {
        let max = lane.fold(T::neg_infinity(), |acc, &v| acc.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.fold(T::zero(), |acc, &v| acc + v);
        lane.mapv_inplace(|v| v / sum);
    }
    out.into_shared()
}

/// How a window's padding is chosen. The SAME modes depend on the input's
/// spatial size and are resolved on every evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoPad {
    #[default]
    NotSet,
    Valid,
    SameUpper,
    SameLower,
}

impl AutoPad {
    pub fn from_onnx_name(name: &str) -> Option<Self> {
        match name {
            "NOTSET" | "" => Some(Self::NotSet),
            "VALID" => Some(Self::Valid),
            "SAME_UPPER" => Some(Self::SameUpper),
            "SAME_LOWER" => Some(Self::SameLower),
            _ => None,
        }
    }

    pub fn onnx_name(&self) -> &'static str {
        match self {
            Self::NotSet => "NOTSET",
            Self::Valid => "VALID",
            Self::SameUpper => "SAME_UPPER",
            Self::SameLower => "SAME_LOWER",
        }
    }

    pub fn is_same(&self) -> bool {
        matches!(self, Self::SameUpper | Self::SameLower)
    }
}

/// Window geometry shared by 2-D convolution and pooling.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Window2d {
    pub kernel: [usize; 2],
    pub strides: [usize; 2],
    /// top, left, bottom, right. Ignored when `auto_pad` is a SAME mode.
    pub pads: [usize; 4],
    pub dilations: [usize; 2],
    pub auto_pad: AutoPad,
}

impl Window2d {
    /// Concrete geometry for an input of spatial size `h` x `w`. SAME modes
    /// pad so the output is `ceil(size / stride)`; an odd remainder goes at
    /// the end for SAME_UPPER and at the beginning for SAME_LOWER.
    fn resolve(&self, h: usize, w: usize) -> Window2d {
        if !self.auto_pad.is_same() {
            return self.clone();
        }
        let mut pads = [0usize; 4];
        for (i, size) in [h, w].into_iter().enumerate() {
            let stride = self.strides[i];
            let out = size.div_ceil(stride);
            let span = self.dilations[i] * (self.kernel[i] - 1) + 1;
            let total = (out.saturating_sub(1) * stride + span).saturating_sub(size);
            let (begin, end) = match self.auto_pad {
                AutoPad::SameLower => (total - total / 2, total / 2),
                _ => (total / 2, total - total / 2),
            };
            pads[i] = begin;
            pads[i + 2] = end;
        }
        Window2d { pads, auto_pad: AutoPad::NotSet, ..self.clone() }
    }

    fn output_dims(&self, h: usize, w: usize) -> Result<(usize, usize), NDArrayOperationError> {
        let mut out = [0usize; 2];
        for (i, size) in [h, w].into_iter().enumerate() {
            let padded = size + self.pads[i] + self.pads[i + 2];
            let span = self.dilations[i] * (self.kernel[i] - 1) + 1;
            if span > padded {
                return Err(NDArrayOperationError::IncompatibleShapes(format!(
                    "window of span {span} exceeds padded input {padded}"
                )));
            }
            out[i] = (padded - span) / self.strides[i] + 1;
        }
        Ok((out[0], out[1]))
    }

    fn source_index(&self, axis: usize, out_pos: usize, k: usize, size: usize) -> Option<usize> {
        let pos = (out_pos * self.strides[axis] + k * self.dilations[axis]) as isize - self.pads[axis] as isize;
        if pos < 0 || pos >= size as isize {
            None
        } else {
            Some(pos as usize)
        }
    }
}

/// NCHW convolution with grouped channels.
pub(crate) fn conv2d<T: Float>(
    input: &ArcArray<T, IxDyn>,
    weight: &ArcArray<T, IxDyn>,
    bias: Option<&ArcArray<T, IxDyn>>,
    window: &Window2d,
    group: usize,
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let x = input.view().into_dimensionality::<Ix4>()?;
    let wt = weight.view().into_dimensionality::<Ix4>()?;
    let (n, c, h, w) = x.dim();
    let (m, cg, kh, kw) = wt.dim();
    let window = &window.resolve(h, w);
    if group == 0 || c != cg * group || m % group != 0 || [kh, kw] != window.kernel {
        return Err(NDArrayOperationError::IncompatibleShapes(format!(
            "conv input {:?} weight {:?} group {group}",
            input.shape(),
            weight.shape()
        )));
    }
    let bias: Option<Vec<T>> = bias.map(|b| b.iter().cloned().collect());
    if let Some(b) = &bias {
        if b.len() != m {
            return Err(NDArrayOperationError::IncompatibleShape);
        }
    }
    let (oh, ow) = window.output_dims(h, w)?;
    let m_per_group = m / group;

    let mut out = Array4::<T>::zeros((n, m, oh, ow));
    for b in 0..n {
        for oc in 0..m {
            let g = oc / m_per_group;
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = bias.as_ref().map(|b| b[oc]).unwrap_or_else(T::zero);
                    for ic in 0..cg {
                        let c_in = g * cg + ic;
                        for ky in 0..kh {
                            let Some(iy) = window.source_index(0, oy, ky, h) else { continue };
                            for kx in 0..kw {
                                let Some(ix) = window.source_index(1, ox, kx, w) else { continue };
                                acc = acc + x[[b, c_in, iy, ix]] * wt[[oc, ic, ky, kx]];
                            }
                        }
                    }
                    out[[b, oc, oy, ox]] = acc;
                }
            }
        }
    }
    Ok(out.into_dyn().into_shared())
}

pub(crate) fn max_pool2d<T: Float>(input: &ArcArray<T, IxDyn>, window: &Window2d) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    let x = input.view().into_dimensionality::<Ix4>()?;
    let (n, c, h, w) = x.dim();
    let window = &window.resolve(h, w);
    let (oh, ow) = window.output_dims(h, w)?;
    let mut out = Array4::<T>::from_elem((n, c, oh, ow), T::neg_infinity());
    for b in 0..n {
        for ch in 0..c {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = T::neg_infinity();
                    for ky in 0..window.kernel[0] {
                        let Some(iy) = window.source_index(0, oy, ky, h) else { continue };
                        for kx in 0..window.kernel[1] {
                            let Some(ix) = window.source_index(1, ox, kx, w) else { continue };
                            acc = acc.max(x[[b, ch, iy, ix]]);
                        }
                    }
                    out[[b, ch, oy, ox]] = acc;
                }
            }
        }
    }
    Ok(out.into_dyn().into_shared())
}

/// Inference-mode batch normalization over channel axis 1.
pub(crate) fn batch_norm<T: Float>(
    input: &ArcArray<T, IxDyn>,
    scale: &[T],
    bias: &[T],
    mean: &[T],
    var: &[T],
    epsilon: T,
) -> Result<ArcArray<T, IxDyn>, NDArrayOperationError> {
    if input.ndim() < 2 {
        return Err(NDArrayOperationError::IncompatibleShape);
    }
    let channels = input.shape()[1];
    if [scale.len(), bias.len(), mean.len(), var.len()].iter().any(|&l| l != channels) {
        return Err(NDArrayOperationError::IncompatibleShapes(format!(
            "batch norm over {channels} channels"
        )));
    }
    let mut out = input.to_owned();
    for (ch, mut plane) in out.axis_iter_mut(Axis(1)).enumerate() {
        let factor = scale[ch] / (var[ch] + epsilon).sqrt();
        let shift = bias[ch] - mean[ch] * factor;
        plane.mapv_inplace(|v| v * factor + shift);
    }
    Ok(out.into_shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn arr(shape: &[usize], values: Vec<f32>) -> ArcArray<f32, IxDyn> {
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap().into_shared()
    }

    #[test]
    fn broadcast_shapes_follow_numpy_rules() {
        assert_eq!(broadcast_shapes(&[2, 1, 3], &[4, 1]).unwrap(), vec![2, 4, 3]);
        assert_eq!(broadcast_shapes(&[], &[5]).unwrap(), vec![5]);
        assert!(broadcast_shapes(&[2, 3], &[4]).is_err());
    }

    #[test]
    fn matmul_promotes_rank_one_operands() {
        let a = arr(&[3], vec![1.0, 2.0, 3.0]);
        let b = arr(&[3, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let out = matmul(&a, &b).unwrap();
        assert_eq!(out.shape(), &[2]);
        assert_eq!(out.iter().cloned().collect::<Vec<_>>(), vec![4.0, 5.0]);
    }

    #[test]
    fn matmul_broadcasts_batch_dims() {
        let a = arr(&[2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let b = arr(&[2, 1], vec![1.0, 1.0]);
        let out = matmul(&a, &b).unwrap();
        assert_eq!(out.shape(), &[2, 1, 1]);
        assert_eq!(out.iter().cloned().collect::<Vec<_>>(), vec![3.0, 7.0]);
    }

    #[test]
    fn negative_slice_steps_walk_backwards() {
        let a = arr(&[5], vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let spec = onnx_slice_spec(5, -1, i64::MIN, -2).unwrap();
        let out = slice_axes(&a, &[Some(spec)]);
        assert_eq!(out.iter().cloned().collect::<Vec<_>>(), vec![4.0, 2.0, 0.0]);
        let empty = onnx_slice_spec(5, 1, 3, -1).unwrap();
        assert_eq!(slice_axes(&a, &[Some(empty)]).len(), 0);
    }

    #[test]
    fn padded_conv_keeps_spatial_size() {
        let x = arr(&[1, 1, 3, 3], (1..=9).map(|v| v as f32).collect());
        let w = arr(&[1, 1, 3, 3], vec![1.0; 9]);
        let window = Window2d { kernel: [3, 3], strides: [1, 1], pads: [1, 1, 1, 1], dilations: [1, 1], auto_pad: AutoPad::NotSet };
        let out = conv2d(&x, &w, None, &window, 1).unwrap();
        assert_eq!(out.shape(), &[1, 1, 3, 3]);
        // Center sees the whole input
        assert_eq!(out[IxDyn(&[0, 0, 1, 1])], 45.0);
        // Corner sees a 2x2 patch
        assert_eq!(out[IxDyn(&[0, 0, 0, 0])], 1.0 + 2.0 + 4.0 + 5.0);
    }

    #[test]
    fn same_padding_follows_input_size() {
        let window = Window2d { kernel: [3, 3], strides: [2, 2], pads: [0; 4], dilations: [1, 1], auto_pad: AutoPad::SameUpper };
        let w = arr(&[1, 1, 3, 3], vec![1.0; 9]);
        for (size, expected) in [(4usize, 2usize), (5, 3), (7, 4)] {
            let x = arr(&[1, 1, size, size], vec![1.0; size * size]);
            let out = conv2d(&x, &w, None, &window, 1).unwrap();
            assert_eq!(out.shape(), &[1, 1, expected, expected]);
        }
        // 4x4 input: total pad 1, placed at the end for SAME_UPPER
        let x = arr(&[1, 1, 4, 4], vec![1.0; 16]);
        let out = conv2d(&x, &w, None, &window, 1).unwrap();
        assert_eq!(out.iter().cloned().collect::<Vec<_>>(), vec![9.0, 6.0, 6.0, 4.0]);
        let lower = Window2d { auto_pad: AutoPad::SameLower, ..window.clone() };
        let out = conv2d(&x, &w, None, &lower, 1).unwrap();
        assert_eq!(out.iter().cloned().collect::<Vec<_>>(), vec![4.0, 6.0, 6.0, 9.0]);
        let pooled = max_pool2d(&arr(&[1, 1, 4, 4], (1..=16).map(|v| v as f32).collect()), &window).unwrap();
        assert_eq!(pooled.iter().cloned().collect::<Vec<_>>(), vec![11.0, 12.0, 15.0, 16.0]);
    }
}
