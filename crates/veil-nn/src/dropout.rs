//! Inverted dropout, keyed explicitly.

use veil_core::{PrngKey, Result, Tensor, VeilError};

/// Zero each element with probability `rate` and scale survivors by
/// `1 / (1 - rate)`, so the expected activation is unchanged.
///
/// Identity when `train` is false or `rate` is zero. The caller supplies the
/// key; dropout never advances shared random state.
pub fn dropout(x: &Tensor, rate: f32, train: bool, key: PrngKey) -> Result<Tensor> {
    if !(0.0..1.0).contains(&rate) {
        return Err(VeilError::InvalidArgument(format!("dropout rate {rate} not in [0, 1)")));
    }
    if !train || rate == 0.0 {
        return Ok(x.clone());
    }

    let noise = key.uniform(x.shape().dims());
    let scale = 1.0 / (1.0 - rate);
    let data = x.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;
    let n = noise.as_f32_slice().unwrap();

    let out: Vec<f32> = src
        .iter()
        .zip(n.iter())
        .map(|(&v, &u)| if u < rate { 0.0 } else { v * scale })
        .collect();
    Ok(Tensor::from_f32(&out, x.shape().dims()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{PrngKey, Tensor};

    #[test]
    fn test_eval_is_identity() {
        let x = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let y = dropout(&x, 0.5, false, PrngKey::new(0)).unwrap();
        assert_eq!(y.as_f32_slice().unwrap(), x.as_f32_slice().unwrap());
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let x = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let y = dropout(&x, 0.0, true, PrngKey::new(0)).unwrap();
        assert_eq!(y.as_f32_slice().unwrap(), x.as_f32_slice().unwrap());
    }

    #[test]
    fn test_survivors_scaled() {
        let x = Tensor::ones(&[1000]);
        let y = dropout(&x, 0.5, true, PrngKey::new(7)).unwrap();
        let data = y.as_f32_slice().unwrap();
        assert!(data.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
        let kept = data.iter().filter(|&&v| v != 0.0).count();
        assert!(kept > 350 && kept < 650, "kept={kept}");
    }

    #[test]
    fn test_deterministic_under_key() {
        let x = Tensor::ones(&[64]);
        let a = dropout(&x, 0.3, true, PrngKey::new(9)).unwrap();
        let b = dropout(&x, 0.3, true, PrngKey::new(9)).unwrap();
        assert_eq!(a.as_f32_slice().unwrap(), b.as_f32_slice().unwrap());
    }

    #[test]
    fn test_invalid_rate() {
        let x = Tensor::ones(&[2]);
        assert!(dropout(&x, 1.0, true, PrngKey::new(0)).is_err());
        assert!(dropout(&x, -0.1, true, PrngKey::new(0)).is_err());
    }
}
