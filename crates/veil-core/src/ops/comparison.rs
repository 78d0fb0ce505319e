//! Element-wise comparison operations, returning 0/1 F32 tensors.

use crate::dtype::DType;
use crate::error::VeilError;
use crate::tensor::Tensor;
use crate::Result;

impl Tensor {
    /// Element-wise equality. Works on F32 and I64 operands of equal shape.
    pub fn eq_tensor(&self, other: &Tensor) -> Result<Tensor> {
        if self.dtype() != other.dtype() {
            return Err(VeilError::DTypeMismatch { expected: self.dtype(), got: other.dtype() });
        }
        if self.shape() != other.shape() {
            return Err(VeilError::ShapeMismatch {
                expected: self.shape().dims().to_vec(),
                got: other.shape().dims().to_vec(),
            });
        }

        let a = self.contiguous();
        let b = other.contiguous();
        let result: Vec<f32> = match self.dtype() {
            DType::F32 => {
                let a_data = a.as_f32_slice().unwrap();
                let b_data = b.as_f32_slice().unwrap();
                a_data
                    .iter()
                    .zip(b_data.iter())
                    .map(|(&x, &y)| if x == y { 1.0 } else { 0.0 })
                    .collect()
            }
            DType::I64 => {
                let a_data = a.as_i64_slice().unwrap();
                let b_data = b.as_i64_slice().unwrap();
                a_data
                    .iter()
                    .zip(b_data.iter())
                    .map(|(&x, &y)| if x == y { 1.0 } else { 0.0 })
                    .collect()
            }
            other => return Err(VeilError::UnsupportedDType(other)),
        };

        Ok(Tensor::from_f32(&result, self.shape().dims()))
    }

    /// Element-wise greater-than.
    pub fn gt(&self, other: &Tensor) -> Result<Tensor> {
        compare_f32(self, other, |a, b| a > b)
    }

    /// Element-wise less-than.
    pub fn lt(&self, other: &Tensor) -> Result<Tensor> {
        compare_f32(self, other, |a, b| a < b)
    }

    /// Element-wise greater-or-equal.
    pub fn ge(&self, other: &Tensor) -> Result<Tensor> {
        compare_f32(self, other, |a, b| a >= b)
    }

    /// Element-wise less-or-equal.
    pub fn le(&self, other: &Tensor) -> Result<Tensor> {
        compare_f32(self, other, |a, b| a <= b)
    }
}

fn compare_f32(a: &Tensor, b: &Tensor, op: impl Fn(f32, f32) -> bool) -> Result<Tensor> {
    if a.dtype() != DType::F32 || b.dtype() != DType::F32 {
        return Err(VeilError::UnsupportedDType(a.dtype()));
    }
    if a.shape() != b.shape() {
        return Err(VeilError::ShapeMismatch {
            expected: a.shape().dims().to_vec(),
            got: b.shape().dims().to_vec(),
        });
    }

    let a_cont = a.contiguous();
    let b_cont = b.contiguous();
    let a_data = a_cont.as_f32_slice().unwrap();
    let b_data = b_cont.as_f32_slice().unwrap();

    let result: Vec<f32> = a_data
        .iter()
        .zip(b_data.iter())
        .map(|(&x, &y)| if op(x, y) { 1.0 } else { 0.0 })
        .collect();

    Ok(Tensor::from_f32(&result, a.shape().dims()))
}
