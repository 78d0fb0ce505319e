//! Pre-norm transformer block.

use veil_core::{PrngKey, Result, Tensor};
use veil_nn::{drop_path, dropout, LayerNorm, Params};

use crate::feed_forward::Mlp;
use crate::mha::MultiHeadAttention;

/// `x + DropPath(Drop(Attn(LN(x))))` followed by
/// `x + DropPath(MLP(LN(x)))`.
///
/// Dropout and stochastic depth draw from two separate key streams so the
/// two kinds of noise stay independent; each stream is folded per site in a
/// fixed order (attention first, MLP second).
#[derive(Debug, Clone, Copy)]
pub struct Block {
    pub dim: usize,
    pub drop_path_rate: f32,
    norm1: LayerNorm,
    attn: MultiHeadAttention,
    norm2: LayerNorm,
    mlp: Mlp,
    drop_rate: f32,
}

impl Block {
    pub fn new(
        dim: usize,
        num_heads: usize,
        mlp_ratio: f32,
        qkv_bias: bool,
        drop_rate: f32,
        drop_path_rate: f32,
    ) -> Result<Self> {
        let hidden = (dim as f32 * mlp_ratio) as usize;
        Ok(Self {
            dim,
            drop_path_rate,
            norm1: LayerNorm::new(dim),
            attn: MultiHeadAttention::new(dim, num_heads, qkv_bias)?,
            norm2: LayerNorm::new(dim),
            mlp: Mlp::new(dim, hidden, dim, drop_rate),
            drop_rate,
        })
    }

    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        self.norm1.init(params, &format!("{path}.norm1"));
        self.attn.init(key.fold_in(0), params, &format!("{path}.attn"));
        self.norm2.init(params, &format!("{path}.norm2"));
        self.mlp.init(key.fold_in(1), params, &format!("{path}.mlp"));
    }

    pub fn forward(
        &self,
        params: &Params,
        path: &str,
        x: &Tensor,
        train: bool,
        drop_key: PrngKey,
        path_key: PrngKey,
    ) -> Result<Tensor> {
        let h = self.norm1.forward(params, &format!("{path}.norm1"), x)?;
        let h = self.attn.forward(params, &format!("{path}.attn"), &h)?;
        let h = dropout(&h, self.drop_rate, train, drop_key.fold_in(0))?;
        let h = drop_path(&h, self.drop_path_rate, train, path_key.fold_in(0))?;
        let x = x.add(&h)?;

        let h = self.norm2.forward(params, &format!("{path}.norm2"), &x)?;
        let h =
            self.mlp.forward(params, &format!("{path}.mlp"), &h, train, drop_key.fold_in(1))?;
        let h = drop_path(&h, self.drop_path_rate, train, path_key.fold_in(1))?;
        x.add(&h)
    }
}
