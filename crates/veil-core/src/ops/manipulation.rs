//! Tensor manipulation operations: cat, stack, split, chunk, gather, argsort,
//! masked_fill, softmax.

use crate::dtype::DType;
use crate::error::VeilError;
use crate::tensor::Tensor;
use crate::Result;

impl Tensor {
    /// Concatenate tensors along a given axis.
    ///
    /// All tensors must have the same shape except along `axis`.
    pub fn cat(tensors: &[&Tensor], axis: isize) -> Result<Tensor> {
        if tensors.is_empty() {
            return Err(VeilError::InvalidArgument("cat: empty tensor list".into()));
        }
        let first = tensors[0];
        let ndim = first.ndim();
        if ndim == 0 {
            return Err(VeilError::InvalidArgument("cat: cannot concatenate scalars".into()));
        }

        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }

        // Validate shapes match on all non-cat axes
        for t in &tensors[1..] {
            if t.ndim() != ndim {
                return Err(VeilError::ShapeMismatch {
                    expected: first.shape().dims().to_vec(),
                    got: t.shape().dims().to_vec(),
                });
            }
            for d in 0..ndim {
                if d != axis && t.shape().dims()[d] != first.shape().dims()[d] {
                    return Err(VeilError::ShapeMismatch {
                        expected: first.shape().dims().to_vec(),
                        got: t.shape().dims().to_vec(),
                    });
                }
            }
        }

        let mut out_shape: Vec<usize> = first.shape().dims().to_vec();
        let cat_dim: usize = tensors.iter().map(|t| t.shape().dims()[axis]).sum();
        out_shape[axis] = cat_dim;

        let numel: usize = out_shape.iter().product();
        let mut result = vec![0.0f32; numel];

        let outer: usize = out_shape[..axis].iter().product();
        let inner: usize = out_shape[axis + 1..].iter().product();

        let mut cat_offset = 0;
        for t in tensors {
            let t_cont = t.contiguous();
            let t_data = t_cont.as_f32_slice().ok_or(VeilError::UnsupportedDType(t.dtype()))?;
            let t_axis_size = t.shape().dims()[axis];

            for o in 0..outer {
                for a in 0..t_axis_size {
                    let src_start = (o * t_axis_size + a) * inner;
                    let dst_start = (o * cat_dim + (cat_offset + a)) * inner;
                    result[dst_start..dst_start + inner]
                        .copy_from_slice(&t_data[src_start..src_start + inner]);
                }
            }
            cat_offset += t_axis_size;
        }

        Ok(Tensor::from_f32(&result, &out_shape))
    }

    /// Stack tensors along a new axis.
    ///
    /// All tensors must have the same shape. A new dimension is inserted at `axis`.
    pub fn stack(tensors: &[&Tensor], axis: isize) -> Result<Tensor> {
        if tensors.is_empty() {
            return Err(VeilError::InvalidArgument("stack: empty tensor list".into()));
        }
        let first = tensors[0];
        let ndim = first.ndim();
        let axis = if axis < 0 { (ndim as isize + 1 + axis) as usize } else { axis as usize };
        if axis > ndim {
            return Err(VeilError::InvalidAxis { axis, ndim: ndim + 1 });
        }

        for t in &tensors[1..] {
            if t.shape().dims() != first.shape().dims() {
                return Err(VeilError::ShapeMismatch {
                    expected: first.shape().dims().to_vec(),
                    got: t.shape().dims().to_vec(),
                });
            }
        }

        // Unsqueeze each tensor at axis, then cat
        let mut unsqueezed: Vec<Tensor> = Vec::with_capacity(tensors.len());
        for t in tensors {
            let mut new_shape: Vec<isize> = t.shape().dims().iter().map(|&d| d as isize).collect();
            new_shape.insert(axis, 1);
            unsqueezed.push(t.reshape(&new_shape)?);
        }

        let refs: Vec<&Tensor> = unsqueezed.iter().collect();
        Tensor::cat(&refs, axis as isize)
    }

    /// Split tensor into pieces of `split_size` along an axis.
    ///
    /// Last piece may be smaller.
    pub fn split(&self, split_size: usize, axis: isize) -> Result<Vec<Tensor>> {
        if split_size == 0 {
            return Err(VeilError::InvalidArgument("split: split_size must be > 0".into()));
        }
        let ndim = self.ndim();
        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }

        let dim_size = self.shape().dims()[axis];
        let data = self.contiguous();
        let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(self.dtype()))?;

        let outer: usize = self.shape().dims()[..axis].iter().product();
        let inner: usize = self.shape().dims()[axis + 1..].iter().product();

        let mut results = Vec::new();
        let mut offset = 0;
        while offset < dim_size {
            let this_size = split_size.min(dim_size - offset);
            let mut chunk_shape = self.shape().dims().to_vec();
            chunk_shape[axis] = this_size;
            let chunk_numel: usize = chunk_shape.iter().product();
            let mut chunk_data = vec![0.0f32; chunk_numel];

            for o in 0..outer {
                for a in 0..this_size {
                    let src_start = (o * dim_size + (offset + a)) * inner;
                    let dst_start = (o * this_size + a) * inner;
                    chunk_data[dst_start..dst_start + inner]
                        .copy_from_slice(&src[src_start..src_start + inner]);
                }
            }

            results.push(Tensor::from_f32(&chunk_data, &chunk_shape));
            offset += this_size;
        }

        Ok(results)
    }

    /// Split tensor into `chunks` roughly-equal pieces along an axis.
    pub fn chunk(&self, chunks: usize, axis: isize) -> Result<Vec<Tensor>> {
        if chunks == 0 {
            return Err(VeilError::InvalidArgument("chunk: chunks must be > 0".into()));
        }
        let ndim = self.ndim();
        let resolved = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if resolved >= ndim {
            return Err(VeilError::InvalidAxis { axis: resolved, ndim });
        }

        let dim_size = self.shape().dims()[resolved];
        let chunk_size = dim_size.div_ceil(chunks);
        self.split(chunk_size, axis)
    }

    /// Slice `len` entries starting at `start` along `axis`.
    pub fn narrow(&self, axis: isize, start: usize, len: usize) -> Result<Tensor> {
        let ndim = self.ndim();
        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }
        let dim_size = self.shape().dims()[axis];
        if start + len > dim_size {
            return Err(VeilError::InvalidArgument(format!(
                "narrow: range {start}..{} out of bounds for axis of size {dim_size}",
                start + len
            )));
        }

        let data = self.contiguous();
        let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(self.dtype()))?;

        let outer: usize = self.shape().dims()[..axis].iter().product();
        let inner: usize = self.shape().dims()[axis + 1..].iter().product();

        let mut out_shape = self.shape().dims().to_vec();
        out_shape[axis] = len;
        let mut result = vec![0.0f32; outer * len * inner];

        for o in 0..outer {
            for a in 0..len {
                let src_start = (o * dim_size + start + a) * inner;
                let dst_start = (o * len + a) * inner;
                result[dst_start..dst_start + inner]
                    .copy_from_slice(&src[src_start..src_start + inner]);
            }
        }

        Ok(Tensor::from_f32(&result, &out_shape))
    }

    /// Gather elements along an axis using an I64 index tensor.
    ///
    /// `index` must have the same number of dimensions as `self`; output has
    /// the shape of `index`.
    pub fn gather(&self, axis: isize, index: &Tensor) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        if index.dtype() != DType::I64 {
            return Err(VeilError::DTypeMismatch { expected: DType::I64, got: index.dtype() });
        }
        let ndim = self.ndim();
        if index.ndim() != ndim {
            return Err(VeilError::ShapeMismatch {
                expected: self.shape().dims().to_vec(),
                got: index.shape().dims().to_vec(),
            });
        }
        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }

        let data = self.contiguous();
        let src = data.as_f32_slice().unwrap();
        let idx_data = index.contiguous();
        let indices = idx_data.as_i64_slice().unwrap();

        let out_shape = index.shape().dims().to_vec();
        let numel: usize = out_shape.iter().product();
        let mut result = vec![0.0f32; numel];

        let src_shape = self.shape().dims();
        let src_strides = compute_strides(src_shape);
        let out_strides = compute_strides(&out_shape);

        for flat_idx in 0..numel {
            let mut multi_idx = vec![0usize; ndim];
            let mut remaining = flat_idx;
            for d in 0..ndim {
                multi_idx[d] = remaining / out_strides[d];
                remaining %= out_strides[d];
            }

            let gathered = indices[flat_idx];
            if gathered < 0 || gathered as usize >= src_shape[axis] {
                return Err(VeilError::InvalidArgument(format!(
                    "gather: index {} out of range for axis {} with size {}",
                    gathered, axis, src_shape[axis]
                )));
            }
            multi_idx[axis] = gathered as usize;

            let src_flat: usize =
                multi_idx.iter().zip(src_strides.iter()).map(|(&i, &s)| i * s).sum();
            result[flat_idx] = src[src_flat];
        }

        Ok(Tensor::from_f32(&result, &out_shape))
    }

    /// Indices that would sort each slice along the last axis, ascending.
    ///
    /// Stable, so equal keys keep their original order. Accepts F32 or I64
    /// input and always returns an I64 tensor of the same shape.
    pub fn argsort(&self) -> Result<Tensor> {
        let ndim = self.ndim();
        if ndim == 0 {
            return Err(VeilError::InvalidArgument("argsort: scalar input".into()));
        }
        let data = self.contiguous();
        let dims = data.shape().dims();
        let last = dims[ndim - 1];
        let rows: usize = dims[..ndim - 1].iter().product::<usize>().max(1);

        let mut result = vec![0i64; rows * last];
        match self.dtype() {
            DType::F32 => {
                let src = data.as_f32_slice().unwrap();
                for r in 0..rows {
                    let row = &src[r * last..(r + 1) * last];
                    let mut idx: Vec<usize> = (0..last).collect();
                    idx.sort_by(|&a, &b| {
                        row[a].partial_cmp(&row[b]).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    for (j, &i) in idx.iter().enumerate() {
                        result[r * last + j] = i as i64;
                    }
                }
            }
            DType::I64 => {
                let src = data.as_i64_slice().unwrap();
                for r in 0..rows {
                    let row = &src[r * last..(r + 1) * last];
                    let mut idx: Vec<usize> = (0..last).collect();
                    idx.sort_by_key(|&a| row[a]);
                    for (j, &i) in idx.iter().enumerate() {
                        result[r * last + j] = i as i64;
                    }
                }
            }
            other => return Err(VeilError::UnsupportedDType(other)),
        }

        Ok(Tensor::from_i64(&result, dims))
    }

    /// Replace elements where `mask > 0` with `value`.
    pub fn masked_fill(&self, mask: &Tensor, value: f32) -> Result<Tensor> {
        if self.dtype() != DType::F32 || mask.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        if self.shape() != mask.shape() {
            return Err(VeilError::ShapeMismatch {
                expected: self.shape().dims().to_vec(),
                got: mask.shape().dims().to_vec(),
            });
        }

        let data = self.contiguous();
        let m = mask.contiguous();
        let d = data.as_f32_slice().unwrap();
        let m_data = m.as_f32_slice().unwrap();

        let result: Vec<f32> =
            d.iter().zip(m_data.iter()).map(|(&v, &m)| if m > 0.0 { value } else { v }).collect();

        Ok(Tensor::from_f32(&result, self.shape().dims()))
    }

    /// Softmax over the given axis.
    pub fn softmax(&self, axis: isize) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        let ndim = self.ndim();
        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }

        let data = self.contiguous();
        let src = data.as_f32_slice().unwrap();
        let mut result = src.to_vec();

        let outer: usize = self.shape().dims()[..axis].iter().product();
        let axis_size = self.shape().dims()[axis];
        let inner: usize = self.shape().dims()[axis + 1..].iter().product();

        for o in 0..outer {
            for i in 0..inner {
                // Subtract the row max for numerical stability
                let mut max_val = f32::NEG_INFINITY;
                for a in 0..axis_size {
                    let idx = (o * axis_size + a) * inner + i;
                    if result[idx] > max_val {
                        max_val = result[idx];
                    }
                }

                let mut sum = 0.0f32;
                for a in 0..axis_size {
                    let idx = (o * axis_size + a) * inner + i;
                    result[idx] = (result[idx] - max_val).exp();
                    sum += result[idx];
                }

                if sum > 0.0 {
                    for a in 0..axis_size {
                        let idx = (o * axis_size + a) * inner + i;
                        result[idx] /= sum;
                    }
                }
            }
        }

        Ok(Tensor::from_f32(&result, self.shape().dims()))
    }

    /// Log-softmax over the given axis.
    pub fn log_softmax(&self, axis: isize) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        let ndim = self.ndim();
        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }

        let data = self.contiguous();
        let src = data.as_f32_slice().unwrap();
        let mut result = src.to_vec();

        let outer: usize = self.shape().dims()[..axis].iter().product();
        let axis_size = self.shape().dims()[axis];
        let inner: usize = self.shape().dims()[axis + 1..].iter().product();

        for o in 0..outer {
            for i in 0..inner {
                let mut max_val = f32::NEG_INFINITY;
                for a in 0..axis_size {
                    let idx = (o * axis_size + a) * inner + i;
                    if result[idx] > max_val {
                        max_val = result[idx];
                    }
                }

                let mut log_sum_exp = 0.0f32;
                for a in 0..axis_size {
                    let idx = (o * axis_size + a) * inner + i;
                    log_sum_exp += (result[idx] - max_val).exp();
                }
                let log_sum_exp = max_val + log_sum_exp.ln();

                for a in 0..axis_size {
                    let idx = (o * axis_size + a) * inner + i;
                    result[idx] -= log_sum_exp;
                }
            }
        }

        Ok(Tensor::from_f32(&result, self.shape().dims()))
    }
}

fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}
