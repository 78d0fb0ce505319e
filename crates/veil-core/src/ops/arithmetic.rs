//! Element-wise arithmetic and matrix multiplication.

use crate::dtype::DType;
use crate::error::VeilError;
use crate::tensor::Tensor;
use crate::{Result, Shape};

impl Tensor {
    /// Element-wise addition with broadcasting: self + other.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, |a, b| a + b)
    }

    /// Element-wise subtraction with broadcasting: self - other.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, |a, b| a - b)
    }

    /// Element-wise multiplication with broadcasting: self * other.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, |a, b| a * b)
    }

    /// Element-wise division with broadcasting: self / other.
    pub fn div(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, |a, b| a / b)
    }

    /// Element-wise negation.
    pub fn neg(&self) -> Result<Tensor> {
        unary_op(self, |a| -a)
    }

    /// Element-wise absolute value.
    pub fn abs(&self) -> Result<Tensor> {
        unary_op(self, |a| a.abs())
    }

    /// Element-wise square root.
    pub fn sqrt(&self) -> Result<Tensor> {
        unary_op(self, |a| a.sqrt())
    }

    /// Element-wise exponential.
    pub fn exp(&self) -> Result<Tensor> {
        unary_op(self, |a| a.exp())
    }

    /// Element-wise natural logarithm.
    pub fn log(&self) -> Result<Tensor> {
        unary_op(self, |a| a.ln())
    }

    /// Element-wise power: self^exponent.
    pub fn pow_scalar(&self, exponent: f32) -> Result<Tensor> {
        unary_op(self, |a| a.powf(exponent))
    }

    /// Scalar addition: self + scalar.
    pub fn add_scalar(&self, scalar: f32) -> Result<Tensor> {
        unary_op(self, |a| a + scalar)
    }

    /// Scalar subtraction: self - scalar.
    pub fn sub_scalar(&self, scalar: f32) -> Result<Tensor> {
        unary_op(self, |a| a - scalar)
    }

    /// Scalar multiplication: self * scalar.
    pub fn mul_scalar(&self, scalar: f32) -> Result<Tensor> {
        unary_op(self, |a| a * scalar)
    }

    /// Clamp all elements to [min, max].
    pub fn clamp(&self, min: f32, max: f32) -> Result<Tensor> {
        unary_op(self, |a| a.clamp(min, max))
    }

    /// Matrix multiplication: self @ other.
    ///
    /// Supports:
    /// - [M, K] @ [K, N] → [M, N]
    /// - [B, M, K] @ [B, K, N] → [B, M, N] (batched)
    /// - [M, K] @ [K] → [M]
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        if self.dtype() != DType::F32 || other.dtype() != DType::F32 {
            return Err(VeilError::UnsupportedDType(self.dtype()));
        }

        let a = self.contiguous();
        let b = other.contiguous();
        let a_dims = a.shape().dims();
        let b_dims = b.shape().dims();

        match (a_dims.len(), b_dims.len()) {
            (2, 2) => matmul_2d(&a, &b),
            (3, 3) => matmul_batched(&a, &b),
            (2, 1) => matvec(&a, &b),
            _ => Err(VeilError::ShapeMismatch {
                expected: a_dims.to_vec(),
                got: b_dims.to_vec(),
            }),
        }
    }
}

/// Apply a unary op element-wise (F32 only).
fn unary_op(a: &Tensor, op: impl Fn(f32) -> f32) -> Result<Tensor> {
    if a.dtype() != DType::F32 {
        return Err(VeilError::UnsupportedDType(a.dtype()));
    }
    let a = a.contiguous();
    let data = a.as_f32_slice().unwrap();
    let result: Vec<f32> = data.iter().map(|&v| op(v)).collect();
    Ok(Tensor::from_f32(&result, a.shape().dims()))
}

/// Apply a binary op element-wise with broadcasting (F32 only).
fn binary_op(a: &Tensor, b: &Tensor, op: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
    if a.dtype() != DType::F32 || b.dtype() != DType::F32 {
        return Err(VeilError::DTypeMismatch { expected: a.dtype(), got: b.dtype() });
    }

    let out_shape =
        a.shape().broadcast_with(b.shape()).ok_or_else(|| VeilError::BroadcastError {
            a: a.shape().dims().to_vec(),
            b: b.shape().dims().to_vec(),
        })?;

    let numel = out_shape.numel();
    let mut result = vec![0.0f32; numel];

    if a.shape() == b.shape() && a.is_contiguous() && b.is_contiguous() {
        let a_data = a.as_f32_slice().unwrap();
        let b_data = b.as_f32_slice().unwrap();
        for i in 0..numel {
            result[i] = op(a_data[i], b_data[i]);
        }
    } else {
        let a_cont = a.contiguous();
        let b_cont = b.contiguous();
        let a_data = a_cont.as_f32_slice().unwrap();
        let b_data = b_cont.as_f32_slice().unwrap();

        for (i, slot) in result.iter_mut().enumerate() {
            let a_idx = broadcast_index(i, &out_shape, a.shape());
            let b_idx = broadcast_index(i, &out_shape, b.shape());
            *slot = op(a_data[a_idx], b_data[b_idx]);
        }
    }

    Ok(Tensor::from_f32(&result, out_shape.dims()))
}

/// Source index for one broadcasted output element.
fn broadcast_index(flat_idx: usize, out_shape: &Shape, src_shape: &Shape) -> usize {
    let out_dims = out_shape.dims();
    let src_dims = src_shape.dims();
    let out_ndim = out_dims.len();
    let src_ndim = src_dims.len();

    let mut remaining = flat_idx;
    let mut src_idx = 0;
    let out_strides = out_shape.contiguous_strides();
    let src_strides = src_shape.contiguous_strides();

    for i in 0..out_ndim {
        let coord = remaining / out_strides[i];
        remaining %= out_strides[i];

        let src_dim_idx = i as isize - (out_ndim as isize - src_ndim as isize);
        if src_dim_idx >= 0 {
            let si = src_dim_idx as usize;
            if src_dims[si] > 1 {
                src_idx += coord * src_strides[si];
            }
        }
    }

    src_idx
}

fn matmul_2d(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();
    let (m, k1) = (a_dims[0], a_dims[1]);
    let (k2, n) = (b_dims[0], b_dims[1]);

    if k1 != k2 {
        return Err(VeilError::MatmulDimMismatch { m, k1, k2, n });
    }

    let a_data = a.as_f32_slice().unwrap();
    let b_data = b.as_f32_slice().unwrap();
    let mut c_data = vec![0.0f32; m * n];

    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k1 {
                sum += a_data[i * k1 + p] * b_data[p * n + j];
            }
            c_data[i * n + j] = sum;
        }
    }

    Ok(Tensor::from_f32(&c_data, &[m, n]))
}

fn matmul_batched(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();
    let (batch, m, k1) = (a_dims[0], a_dims[1], a_dims[2]);
    let (k2, n) = (b_dims[1], b_dims[2]);

    if a_dims[0] != b_dims[0] {
        return Err(VeilError::ShapeMismatch {
            expected: a_dims.to_vec(),
            got: b_dims.to_vec(),
        });
    }
    if k1 != k2 {
        return Err(VeilError::MatmulDimMismatch { m, k1, k2, n });
    }

    let a_data = a.as_f32_slice().unwrap();
    let b_data = b.as_f32_slice().unwrap();
    let mut c_data = vec![0.0f32; batch * m * n];

    for bi in 0..batch {
        let a_off = bi * m * k1;
        let b_off = bi * k1 * n;
        let c_off = bi * m * n;
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0f32;
                for p in 0..k1 {
                    sum += a_data[a_off + i * k1 + p] * b_data[b_off + p * n + j];
                }
                c_data[c_off + i * n + j] = sum;
            }
        }
    }

    Ok(Tensor::from_f32(&c_data, &[batch, m, n]))
}

fn matvec(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();
    let (m, k1) = (a_dims[0], a_dims[1]);
    let k2 = b_dims[0];

    if k1 != k2 {
        return Err(VeilError::MatmulDimMismatch { m, k1, k2, n: 1 });
    }

    let a_data = a.as_f32_slice().unwrap();
    let b_data = b.as_f32_slice().unwrap();
    let mut c_data = vec![0.0f32; m];

    for i in 0..m {
        let mut sum = 0.0f32;
        for p in 0..k1 {
            sum += a_data[i * k1 + p] * b_data[p];
        }
        c_data[i] = sum;
    }

    Ok(Tensor::from_f32(&c_data, &[m]))
}

// Operator overloads on references; panic on mismatch like the checked
// methods would error, so reserve these for shapes already validated.
impl std::ops::Add for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Tensor {
        Tensor::add(self, rhs).expect("Add failed")
    }
}

impl std::ops::Sub for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Tensor {
        Tensor::sub(self, rhs).expect("Sub failed")
    }
}

impl std::ops::Mul for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Tensor {
        Tensor::mul(self, rhs).expect("Mul failed")
    }
}

impl std::ops::Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        Tensor::neg(self).expect("Neg failed")
    }
}
