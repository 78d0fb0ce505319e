//! Fully-connected layer over a parameter blob.

use veil_core::{PrngKey, Result, Tensor, VeilError};

use crate::init;
use crate::params::Params;

/// Linear transformation `y = x @ W^T + b`.
///
/// The struct is a shape descriptor only; the weight `[out, in]` and optional
/// bias `[out]` live in the `Params` blob under `{path}.weight` /
/// `{path}.bias`.
#[derive(Debug, Clone, Copy)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub bias: bool,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self { in_features, out_features, bias }
    }

    /// Write freshly initialized weight (Xavier) and bias (zeros) into `params`.
    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        let weight = init::xavier_uniform(key, self.out_features, self.in_features);
        params.insert(format!("{path}.weight"), weight);
        if self.bias {
            params.insert(
                format!("{path}.bias"),
                Tensor::zeros(&[self.out_features], veil_core::DType::F32),
            );
        }
    }

    /// Apply the layer to a `[.., in]` input of rank 2 or 3.
    pub fn forward(&self, params: &Params, path: &str, x: &Tensor) -> Result<Tensor> {
        let dims = x.shape().dims().to_vec();
        let ndim = dims.len();
        if ndim < 2 || dims[ndim - 1] != self.in_features {
            return Err(VeilError::ShapeMismatch {
                expected: vec![self.in_features],
                got: dims.clone(),
            });
        }

        let weight = params.get(&format!("{path}.weight"))?;
        let wt = weight.transpose()?.contiguous();

        // Fold leading dims into one row axis, matmul, unfold
        let rows: usize = dims[..ndim - 1].iter().product();
        let x2 = x.contiguous().reshape(&[rows as isize, self.in_features as isize])?;
        let mut y = x2.matmul(&wt)?;

        if self.bias {
            let bias = params.get(&format!("{path}.bias"))?;
            y = y.add(bias)?;
        }

        let mut out_dims: Vec<isize> = dims[..ndim - 1].iter().map(|&d| d as isize).collect();
        out_dims.push(self.out_features as isize);
        y.reshape(&out_dims)
    }
}
