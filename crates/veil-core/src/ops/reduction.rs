//! Reduction operations: sum, mean, variance, max, min, argmax.

use rayon::prelude::*;

use crate::dtype::DType;
use crate::error::VeilError;
use crate::tensor::Tensor;
use crate::Result;

const PAR_THRESHOLD: usize = 8192;

impl Tensor {
    /// Sum all elements, returning a scalar tensor.
    pub fn sum(&self) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        let data = self.contiguous();
        let slice = data.as_f32_slice().unwrap();
        let total: f32 = if slice.len() >= PAR_THRESHOLD {
            slice.par_iter().sum()
        } else {
            slice.iter().sum()
        };
        Ok(Tensor::scalar(total))
    }

    /// Sum along a specific axis, reducing that dimension.
    pub fn sum_axis(&self, axis: usize) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        if axis >= self.ndim() {
            return Err(VeilError::InvalidAxis { axis, ndim: self.ndim() });
        }

        let data = self.contiguous();
        let dims = data.shape().dims();
        let slice = data.as_f32_slice().unwrap();

        let mut out_dims: Vec<usize> = dims.to_vec();
        out_dims.remove(axis);
        if out_dims.is_empty() {
            return self.sum();
        }

        let out_numel: usize = out_dims.iter().product();
        let mut result = vec![0.0f32; out_numel];

        let axis_size = dims[axis];
        let outer_size: usize = dims[..axis].iter().product();
        let inner_size: usize = dims[axis + 1..].iter().product();

        for outer in 0..outer_size {
            for inner in 0..inner_size {
                let mut acc = 0.0f32;
                for k in 0..axis_size {
                    let idx = outer * axis_size * inner_size + k * inner_size + inner;
                    acc += slice[idx];
                }
                result[outer * inner_size + inner] = acc;
            }
        }

        Ok(Tensor::from_f32(&result, &out_dims))
    }

    /// Mean of all elements, returning a scalar tensor.
    pub fn mean(&self) -> Result<Tensor> {
        let s = self.sum()?;
        let n = self.numel() as f32;
        s.mul_scalar(1.0 / n)
    }

    /// Mean along a specific axis.
    pub fn mean_axis(&self, axis: usize) -> Result<Tensor> {
        let s = self.sum_axis(axis)?;
        let n = self
            .shape()
            .dim(axis)
            .ok_or(VeilError::InvalidAxis { axis, ndim: self.ndim() })? as f32;
        s.mul_scalar(1.0 / n)
    }

    /// Biased variance along a specific axis (divides by N, not N-1).
    pub fn var_axis(&self, axis: usize) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        if axis >= self.ndim() {
            return Err(VeilError::InvalidAxis { axis, ndim: self.ndim() });
        }

        let data = self.contiguous();
        let dims = data.shape().dims();
        let slice = data.as_f32_slice().unwrap();

        let axis_size = dims[axis];
        let outer_size: usize = dims[..axis].iter().product();
        let inner_size: usize = dims[axis + 1..].iter().product();

        let mut out_dims: Vec<usize> = dims.to_vec();
        out_dims.remove(axis);
        let out_numel: usize = out_dims.iter().product::<usize>().max(1);
        let mut result = vec![0.0f32; out_numel];

        for outer in 0..outer_size {
            for inner in 0..inner_size {
                let mut mean = 0.0f32;
                for k in 0..axis_size {
                    let idx = outer * axis_size * inner_size + k * inner_size + inner;
                    mean += slice[idx];
                }
                mean /= axis_size as f32;

                let mut var = 0.0f32;
                for k in 0..axis_size {
                    let idx = outer * axis_size * inner_size + k * inner_size + inner;
                    let d = slice[idx] - mean;
                    var += d * d;
                }
                result[outer * inner_size + inner] = var / axis_size as f32;
            }
        }

        if out_dims.is_empty() {
            return Ok(Tensor::scalar(result[0]));
        }
        Ok(Tensor::from_f32(&result, &out_dims))
    }

    /// Maximum element, returning a scalar tensor.
    pub fn max(&self) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        let data = self.contiguous();
        let slice = data.as_f32_slice().unwrap();
        let val = if slice.len() >= PAR_THRESHOLD {
            slice.par_iter().cloned().reduce(|| f32::NEG_INFINITY, f32::max)
        } else {
            slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
        };
        Ok(Tensor::scalar(val))
    }

    /// Minimum element, returning a scalar tensor.
    pub fn min(&self) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }
        let data = self.contiguous();
        let slice = data.as_f32_slice().unwrap();
        let val = if slice.len() >= PAR_THRESHOLD {
            slice.par_iter().cloned().reduce(|| f32::INFINITY, f32::min)
        } else {
            slice.iter().cloned().fold(f32::INFINITY, f32::min)
        };
        Ok(Tensor::scalar(val))
    }

    /// Index of the maximum element along an axis, as an I64 tensor.
    pub fn argmax(&self, axis: isize) -> Result<Tensor> {
        if self.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }

        let ndim = self.ndim();
        let axis = if axis < 0 { (ndim as isize + axis) as usize } else { axis as usize };
        if axis >= ndim {
            return Err(VeilError::InvalidAxis { axis, ndim });
        }

        let data = self.contiguous();
        let dims = data.shape().dims();
        let slice = data.as_f32_slice().unwrap();

        let axis_size = dims[axis];
        let outer_size: usize = dims[..axis].iter().product();
        let inner_size: usize = dims[axis + 1..].iter().product();

        let out_numel = outer_size * inner_size;
        let mut result = vec![0i64; out_numel];

        for outer in 0..outer_size {
            for inner in 0..inner_size {
                let mut best_val = f32::NEG_INFINITY;
                let mut best_idx = 0i64;
                for k in 0..axis_size {
                    let idx = outer * axis_size * inner_size + k * inner_size + inner;
                    if slice[idx] > best_val {
                        best_val = slice[idx];
                        best_idx = k as i64;
                    }
                }
                result[outer * inner_size + inner] = best_idx;
            }
        }

        let mut out_dims: Vec<usize> = dims.to_vec();
        out_dims.remove(axis);
        if out_dims.is_empty() {
            out_dims.push(1);
        }

        Ok(Tensor::from_i64(&result, &out_dims))
    }
}
