//! Activation functions.

use veil_core::{Result, Tensor, VeilError};

/// GELU with the tanh approximation:
/// `0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))`.
pub fn gelu(x: &Tensor) -> Result<Tensor> {
    const SQRT_2_OVER_PI: f32 = 0.797_884_56;
    let data = x.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;
    let out: Vec<f32> = src
        .iter()
        .map(|&v| 0.5 * v * (1.0 + (SQRT_2_OVER_PI * (v + 0.044715 * v * v * v)).tanh()))
        .collect();
    Ok(Tensor::from_f32(&out, x.shape().dims()))
}
