//! Scaled dot-product attention.

use veil_core::{Result, Tensor, VeilError};

/// `softmax(q k^T / sqrt(d) + mask) v`.
///
/// Accepts `[S, D]` (single head) or `[H, S, D]` (multi-head) inputs. k and
/// v must share a shape and agree with q on every dimension except the
/// sequence axis, so a `[Sq, D]` query can attend over `[Sk, D]` keys.
/// `mask`, if given, is added to the raw scores and must broadcast against
/// `[.., Sq, Sk]`; use a large negative value to block a position.
pub fn scaled_dot_product_attention(
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    mask: Option<&Tensor>,
) -> Result<Tensor> {
    let ndim = q.ndim();
    if ndim != 2 && ndim != 3 {
        return Err(VeilError::InvalidArgument(format!(
            "attention expects rank 2 or 3 input, got rank {ndim}"
        )));
    }
    let q_dims = q.shape().dims();
    let k_dims = k.shape().dims();
    if k.shape() != v.shape()
        || k_dims.len() != ndim
        || k_dims[ndim - 1] != q_dims[ndim - 1]
        || (ndim == 3 && k_dims[0] != q_dims[0])
    {
        return Err(VeilError::ShapeMismatch {
            expected: q_dims.to_vec(),
            got: k_dims.to_vec(),
        });
    }

    let d = q.shape().dims()[ndim - 1];
    let scale = 1.0 / (d as f32).sqrt();

    let kt = k.transpose()?.contiguous();
    let mut scores = q.matmul(&kt)?.mul_scalar(scale)?;

    if let Some(m) = mask {
        scores = scores.add(m)?;
    }

    let attn = scores.softmax(-1)?;
    attn.matmul(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::Tensor;

    #[test]
    fn test_uniform_keys_average_values() {
        // identical keys -> uniform attention -> output is the mean of v
        let q = Tensor::ones(&[2, 4]);
        let k = Tensor::ones(&[2, 4]);
        let v = Tensor::from_f32(&[0.0, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 2.0], &[2, 4]);
        let out = scaled_dot_product_attention(&q, &k, &v, None).unwrap();
        for &x in out.as_f32_slice().unwrap() {
            assert!((x - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sharp_attention_selects_value() {
        let q = Tensor::from_f32(&[10.0, 0.0], &[1, 2]);
        let k = Tensor::from_f32(&[10.0, 0.0, 0.0, 10.0], &[2, 2]);
        let v = Tensor::from_f32(&[1.0, 0.0, 0.0, 1.0], &[2, 2]);
        let out = scaled_dot_product_attention(&q, &k, &v, None).unwrap();
        let data = out.as_f32_slice().unwrap();
        assert!(data[0] > 0.99 && data[1] < 0.01);
    }

    #[test]
    fn test_multi_head_shape() {
        let q = Tensor::ones(&[3, 5, 8]);
        let out = scaled_dot_product_attention(&q, &q, &q, None).unwrap();
        assert_eq!(out.shape().dims(), &[3, 5, 8]);
    }

    #[test]
    fn test_additive_mask_blocks_position() {
        let q = Tensor::ones(&[1, 2, 2]);
        let k = Tensor::ones(&[1, 2, 2]);
        let v = Tensor::from_f32(&[5.0, 5.0, -5.0, -5.0], &[1, 2, 2]);
        // block the second key for every query
        let mask = Tensor::from_f32(&[0.0, -9e15, 0.0, -9e15], &[1, 2, 2]);
        let out = scaled_dot_product_attention(&q, &k, &v, Some(&mask)).unwrap();
        for &x in out.as_f32_slice().unwrap() {
            assert!((x - 5.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_query_and_key_lengths_may_differ() {
        // one query over three keys: output takes the query's length
        let q = Tensor::ones(&[1, 4]);
        let k = Tensor::ones(&[3, 4]);
        let v = Tensor::ones(&[3, 4]);
        let out = scaled_dot_product_attention(&q, &k, &v, None).unwrap();
        assert_eq!(out.shape().dims(), &[1, 4]);

        let q = Tensor::ones(&[2, 5, 8]);
        let kv = Tensor::ones(&[2, 3, 8]);
        let out = scaled_dot_product_attention(&q, &kv, &kv, None).unwrap();
        assert_eq!(out.shape().dims(), &[2, 5, 8]);
    }

    #[test]
    fn test_shape_mismatch() {
        // k and v disagree on length
        let q = Tensor::ones(&[2, 4]);
        let k = Tensor::ones(&[3, 4]);
        assert!(scaled_dot_product_attention(&q, &k, &q, None).is_err());

        // feature widths disagree
        let k = Tensor::ones(&[2, 8]);
        assert!(scaled_dot_product_attention(&q, &k, &k, None).is_err());

        // head counts disagree
        let q3 = Tensor::ones(&[2, 4, 8]);
        let k3 = Tensor::ones(&[3, 4, 8]);
        assert!(scaled_dot_product_attention(&q3, &k3, &k3, None).is_err());
    }
}
