//! Weight initialization schemes.

use veil_core::{PrngKey, Tensor};

/// Xavier/Glorot uniform initialization for a 2-D weight `[fan_out, fan_in]`.
///
/// Samples uniformly from `[-limit, limit]` with
/// `limit = sqrt(6 / (fan_in + fan_out))`.
pub fn xavier_uniform(key: PrngKey, fan_out: usize, fan_in: usize) -> Tensor {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    key.uniform_range(&[fan_out, fan_in], -limit, limit)
}

/// Truncation-free normal initialization with the given standard deviation.
pub fn normal(key: PrngKey, shape: &[usize], std: f32) -> Tensor {
    key.normal(shape, 0.0, std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::PrngKey;

    #[test]
    fn test_xavier_uniform_bounds() {
        let key = PrngKey::new(0);
        let w = xavier_uniform(key, 64, 32);
        assert_eq!(w.shape().dims(), &[64, 32]);
        let limit = (6.0f32 / 96.0).sqrt();
        assert!(w.as_f32_slice().unwrap().iter().all(|&v| v.abs() <= limit));
    }

    #[test]
    fn test_xavier_deterministic() {
        let a = xavier_uniform(PrngKey::new(5), 8, 8);
        let b = xavier_uniform(PrngKey::new(5), 8, 8);
        assert_eq!(a.as_f32_slice().unwrap(), b.as_f32_slice().unwrap());
    }

    #[test]
    fn test_normal_std() {
        let t = normal(PrngKey::new(1), &[4096], 0.02);
        let data = t.as_f32_slice().unwrap();
        let mean: f32 = data.iter().sum::<f32>() / data.len() as f32;
        assert!(mean.abs() < 0.005);
    }
}
