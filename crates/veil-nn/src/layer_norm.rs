//! Layer normalization over the last axis.

use veil_core::{DType, Result, Tensor, VeilError};

use crate::params::Params;

/// LayerNorm with learnable scale and shift.
///
/// Normalizes each row of the last axis to zero mean and unit variance
/// (biased), then applies `weight * x + bias`. Parameters live at
/// `{path}.weight` and `{path}.bias`.
#[derive(Debug, Clone, Copy)]
pub struct LayerNorm {
    pub dim: usize,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(dim: usize) -> Self {
        Self { dim, eps: 1e-6 }
    }

    /// Write weight = ones, bias = zeros into `params`.
    pub fn init(&self, params: &mut Params, path: &str) {
        params.insert(format!("{path}.weight"), Tensor::ones(&[self.dim]));
        params.insert(format!("{path}.bias"), Tensor::zeros(&[self.dim], DType::F32));
    }

    pub fn forward(&self, params: &Params, path: &str, x: &Tensor) -> Result<Tensor> {
        let dims = x.shape().dims().to_vec();
        let ndim = dims.len();
        if ndim == 0 || dims[ndim - 1] != self.dim {
            return Err(VeilError::ShapeMismatch { expected: vec![self.dim], got: dims });
        }

        let weight = params.get(&format!("{path}.weight"))?.contiguous();
        let bias = params.get(&format!("{path}.bias"))?.contiguous();
        let w = weight.as_f32_slice().unwrap();
        let b = bias.as_f32_slice().unwrap();

        let data = x.contiguous();
        let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;
        let rows = src.len() / self.dim;
        let mut out = vec![0.0f32; src.len()];

        for r in 0..rows {
            let row = &src[r * self.dim..(r + 1) * self.dim];
            let mean: f32 = row.iter().sum::<f32>() / self.dim as f32;
            let var: f32 =
                row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / self.dim as f32;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            for i in 0..self.dim {
                out[r * self.dim + i] = (row[i] - mean) * inv_std * w[i] + b[i];
            }
        }

        Ok(Tensor::from_f32(&out, x.shape().dims()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::Tensor;

    #[test]
    fn test_normalizes_rows() {
        let ln = LayerNorm::new(4);
        let mut params = Params::new();
        ln.init(&mut params, "norm");

        let x = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0], &[2, 4]);
        let y = ln.forward(&params, "norm", &x).unwrap();
        let data = y.as_f32_slice().unwrap();

        for r in 0..2 {
            let row = &data[r * 4..(r + 1) * 4];
            let mean: f32 = row.iter().sum::<f32>() / 4.0;
            let var: f32 = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_scale_and_shift() {
        let ln = LayerNorm::new(2);
        let mut params = Params::new();
        params.insert("norm.weight", Tensor::from_f32(&[2.0, 2.0], &[2]));
        params.insert("norm.bias", Tensor::from_f32(&[1.0, 1.0], &[2]));

        let x = Tensor::from_f32(&[-1.0, 1.0], &[1, 2]);
        let y = ln.forward(&params, "norm", &x).unwrap();
        let data = y.as_f32_slice().unwrap();
        assert!((data[0] - (1.0 - 2.0)).abs() < 1e-3);
        assert!((data[1] - (1.0 + 2.0)).abs() < 1e-3);
    }

    #[test]
    fn test_wrong_last_dim() {
        let ln = LayerNorm::new(4);
        let mut params = Params::new();
        ln.init(&mut params, "norm");
        let x = Tensor::ones(&[2, 3]);
        assert!(ln.forward(&params, "norm", &x).is_err());
    }
}
