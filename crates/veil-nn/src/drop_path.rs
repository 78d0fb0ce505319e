//! Stochastic depth (per-sample residual-branch dropout).

use veil_core::{PrngKey, Result, Tensor, VeilError};

/// Drop the whole residual branch for a fraction `rate` of the batch.
///
/// The input is `[B, ..]`; a single Bernoulli draw per sample either zeroes
/// that sample's branch or scales it by `1 / (1 - rate)`. Identity when
/// `train` is false or `rate` is zero.
pub fn drop_path(x: &Tensor, rate: f32, train: bool, key: PrngKey) -> Result<Tensor> {
    if !(0.0..1.0).contains(&rate) {
        return Err(VeilError::InvalidArgument(format!("drop_path rate {rate} not in [0, 1)")));
    }
    if !train || rate == 0.0 {
        return Ok(x.clone());
    }

    let dims = x.shape().dims();
    if dims.is_empty() {
        return Err(VeilError::InvalidArgument("drop_path: scalar input".into()));
    }
    let batch = dims[0];
    let per_sample: usize = dims[1..].iter().product::<usize>().max(1);

    let noise = key.uniform(&[batch]);
    let u = noise.as_f32_slice().unwrap();
    let scale = 1.0 / (1.0 - rate);

    let data = x.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;
    let mut out = vec![0.0f32; src.len()];

    for b in 0..batch {
        let factor = if u[b] < rate { 0.0 } else { scale };
        for i in 0..per_sample {
            out[b * per_sample + i] = src[b * per_sample + i] * factor;
        }
    }

    Ok(Tensor::from_f32(&out, dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{PrngKey, Tensor};

    #[test]
    fn test_eval_is_identity() {
        let x = Tensor::ones(&[2, 3, 4]);
        let y = drop_path(&x, 0.5, false, PrngKey::new(0)).unwrap();
        assert_eq!(y.as_f32_slice().unwrap(), x.as_f32_slice().unwrap());
    }

    #[test]
    fn test_whole_samples_dropped() {
        let x = Tensor::ones(&[32, 4]);
        let y = drop_path(&x, 0.5, true, PrngKey::new(3)).unwrap();
        let data = y.as_f32_slice().unwrap();
        // each sample is uniformly zero or uniformly scaled
        for b in 0..32 {
            let row = &data[b * 4..(b + 1) * 4];
            assert!(
                row.iter().all(|&v| v == 0.0) || row.iter().all(|&v| (v - 2.0).abs() < 1e-6),
                "mixed row: {row:?}"
            );
        }
    }

    #[test]
    fn test_invalid_rate() {
        let x = Tensor::ones(&[2, 2]);
        assert!(drop_path(&x, 1.0, true, PrngKey::new(0)).is_err());
    }
}
