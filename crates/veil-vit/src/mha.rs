//! Multi-head self-attention with a fused QKV projection.

use veil_attention::scaled_dot_product_attention;
use veil_core::{PrngKey, Result, Tensor, VeilError};
use veil_nn::{Linear, Params};

/// Multi-head self-attention over `(B, S, D)` sequences.
///
/// One fused `qkv` projection `[3D, D]` followed by an output projection.
/// Parameters live at `{path}.qkv.*` and `{path}.proj.*`.
#[derive(Debug, Clone, Copy)]
pub struct MultiHeadAttention {
    pub embed_dim: usize,
    pub num_heads: usize,
    qkv: Linear,
    proj: Linear,
}

impl MultiHeadAttention {
    pub fn new(embed_dim: usize, num_heads: usize, qkv_bias: bool) -> Result<Self> {
        if num_heads == 0 {
            return Err(VeilError::Config("attention requires at least one head".into()));
        }
        if embed_dim % num_heads != 0 {
            return Err(VeilError::Config(format!(
                "embed_dim {embed_dim} not divisible by num_heads {num_heads}"
            )));
        }
        Ok(Self {
            embed_dim,
            num_heads,
            qkv: Linear::new(embed_dim, 3 * embed_dim, qkv_bias),
            proj: Linear::new(embed_dim, embed_dim, true),
        })
    }

    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        self.qkv.init(key.fold_in(0), params, &format!("{path}.qkv"));
        self.proj.init(key.fold_in(1), params, &format!("{path}.proj"));
    }

    pub fn forward(&self, params: &Params, path: &str, x: &Tensor) -> Result<Tensor> {
        let dims = x.shape().dims().to_vec();
        if dims.len() != 3 || dims[2] != self.embed_dim {
            return Err(VeilError::ShapeMismatch {
                expected: vec![0, 0, self.embed_dim],
                got: dims,
            });
        }
        let (batch, seq) = (dims[0], dims[1]);

        let qkv = self.qkv.forward(params, &format!("{path}.qkv"), x)?;
        let parts = qkv.chunk(3, -1)?;
        let (q, k, v) = (&parts[0], &parts[1], &parts[2]);

        let mut per_sample = Vec::with_capacity(batch);
        for b in 0..batch {
            let qh = self.split_heads(q, b, seq)?;
            let kh = self.split_heads(k, b, seq)?;
            let vh = self.split_heads(v, b, seq)?;
            let attended = scaled_dot_product_attention(&qh, &kh, &vh, None)?;
            per_sample.push(self.merge_heads(&attended, seq)?);
        }

        let refs: Vec<&Tensor> = per_sample.iter().collect();
        let out = Tensor::stack(&refs, 0)?;
        self.proj.forward(params, &format!("{path}.proj"), &out)
    }

    /// Slice sample `b` out of `(B, S, D)` and lay it out as `(H, S, D/H)`.
    fn split_heads(&self, x: &Tensor, b: usize, seq: usize) -> Result<Tensor> {
        let d = self.embed_dim;
        let hd = d / self.num_heads;
        let data = x.contiguous();
        let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;
        let sample = &src[b * seq * d..][..seq * d];

        let mut out = vec![0.0f32; seq * d];
        for h in 0..self.num_heads {
            for s in 0..seq {
                let dst = &mut out[(h * seq + s) * hd..][..hd];
                dst.copy_from_slice(&sample[s * d + h * hd..][..hd]);
            }
        }
        Ok(Tensor::from_f32(&out, &[self.num_heads, seq, hd]))
    }

    /// Inverse of `split_heads`: `(H, S, D/H)` back to `(S, D)`.
    fn merge_heads(&self, x: &Tensor, seq: usize) -> Result<Tensor> {
        let d = self.embed_dim;
        let hd = d / self.num_heads;
        let data = x.contiguous();
        let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;

        let mut out = vec![0.0f32; seq * d];
        for h in 0..self.num_heads {
            for s in 0..seq {
                let dst = &mut out[s * d + h * hd..][..hd];
                dst.copy_from_slice(&src[(h * seq + s) * hd..][..hd]);
            }
        }
        Ok(Tensor::from_f32(&out, &[seq, d]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::PrngKey;
    use veil_nn::Params;

    fn build(embed_dim: usize, heads: usize) -> (MultiHeadAttention, Params) {
        let mha = MultiHeadAttention::new(embed_dim, heads, true).unwrap();
        let mut params = Params::new();
        mha.init(PrngKey::new(0), &mut params, "attn");
        (mha, params)
    }

    #[test]
    fn test_output_shape() {
        let (mha, params) = build(16, 4);
        let x = PrngKey::new(1).uniform(&[2, 5, 16]);
        let y = mha.forward(&params, "attn", &x).unwrap();
        assert_eq!(y.shape().dims(), &[2, 5, 16]);
    }

    #[test]
    fn test_param_paths() {
        let (_, params) = build(8, 2);
        assert!(params.contains("attn.qkv.weight"));
        assert!(params.contains("attn.qkv.bias"));
        assert!(params.contains("attn.proj.weight"));
        assert!(params.contains("attn.proj.bias"));
        assert_eq!(params.get("attn.qkv.weight").unwrap().shape().dims(), &[24, 8]);
    }

    #[test]
    fn test_invalid_head_split() {
        assert!(MultiHeadAttention::new(10, 3, true).is_err());
        assert!(MultiHeadAttention::new(8, 0, true).is_err());
    }

    #[test]
    fn test_deterministic() {
        let (mha, params) = build(8, 2);
        let x = PrngKey::new(2).uniform(&[1, 4, 8]);
        let a = mha.forward(&params, "attn", &x).unwrap();
        let b = mha.forward(&params, "attn", &x).unwrap();
        assert_eq!(a.as_f32_slice().unwrap(), b.as_f32_slice().unwrap());
    }

    #[test]
    fn test_split_merge_roundtrip() {
        let mha = MultiHeadAttention::new(8, 2, false).unwrap();
        let x = PrngKey::new(3).uniform(&[1, 3, 8]);
        let heads = mha.split_heads(&x, 0, 3).unwrap();
        assert_eq!(heads.shape().dims(), &[2, 3, 4]);
        let back = mha.merge_heads(&heads, 3).unwrap();
        assert_eq!(back.as_f32_slice().unwrap(), x.as_f32_slice().unwrap());
    }
}
