//! MAE decoder: mask-token reinsertion and reconstruction.

use veil_core::{DType, PrngKey, Result, Tensor, VeilError};
use veil_nn::{LayerNorm, Linear, Params};
use veil_vit::{sincos_position_embedding, Block};

use crate::config::MAEConfig;

/// Decoder half of the masked autoencoder.
///
/// Takes the encoder's latent sequence (class token + visible patches in
/// shuffled order), re-inserts mask tokens at hidden positions via the
/// restore permutation, runs M blocks at the decoder width and projects back
/// to flattened-patch pixels.
#[derive(Debug, Clone)]
pub struct MAEDecoder {
    pub decoder_embed_dim: usize,
    num_patches: usize,
    embed: Linear,
    blocks: Vec<Block>,
    norm: LayerNorm,
    pred: Linear,
    pos_table: Tensor,
}

impl MAEDecoder {
    pub fn new(config: &MAEConfig) -> Result<Self> {
        config.validate()?;

        let num_patches = config.num_patches();
        let pos_table = sincos_position_embedding(num_patches, config.decoder_embed_dim, true)?;

        let mut blocks = Vec::with_capacity(config.decoder_depth);
        for _ in 0..config.decoder_depth {
            blocks.push(Block::new(
                config.decoder_embed_dim,
                config.decoder_num_heads,
                config.mlp_ratio,
                true,
                config.drop_rate,
                config.drop_path_rate,
            )?);
        }

        Ok(Self {
            decoder_embed_dim: config.decoder_embed_dim,
            num_patches,
            embed: Linear::new(config.embed_dim, config.decoder_embed_dim, true),
            blocks,
            norm: LayerNorm::new(config.decoder_embed_dim),
            pred: Linear::new(config.decoder_embed_dim, config.patch_dim(), true),
            pos_table,
        })
    }

    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        params.insert(
            format!("{path}.mask_token"),
            Tensor::zeros(&[1, 1, self.decoder_embed_dim], DType::F32),
        );
        self.embed.init(key.fold_in(0), params, &format!("{path}.embed"));
        for (i, block) in self.blocks.iter().enumerate() {
            block.init(key.fold_in(1 + i as u64), params, &format!("{path}.blocks.{i}"));
        }
        self.norm.init(params, &format!("{path}.norm"));
        self.pred.init(key.fold_in(64), params, &format!("{path}.pred"));
    }

    /// Reconstruct all patches: `(B, 1 + keep, embed_dim)` latent plus
    /// `(B, L)` restore permutation to `(B, L, patch_dim)` predictions.
    pub fn forward(
        &self,
        params: &Params,
        path: &str,
        latent: &Tensor,
        ids_restore: &Tensor,
        train: bool,
        drop_key: PrngKey,
        path_key: PrngKey,
    ) -> Result<Tensor> {
        let x = self.embed.forward(params, &format!("{path}.embed"), latent)?;
        let dims = x.shape().dims().to_vec();
        let (batch, seq, width) = (dims[0], dims[1], dims[2]);

        let restore_dims = ids_restore.shape().dims();
        if restore_dims.len() != 2 || restore_dims[0] != batch || restore_dims[1] != self.num_patches
        {
            return Err(VeilError::ShapeMismatch {
                expected: vec![batch, self.num_patches],
                got: restore_dims.to_vec(),
            });
        }
        // latent cannot carry more than the class token plus every patch
        if seq == 0 || seq > self.num_patches + 1 {
            return Err(VeilError::ShapeMismatch {
                expected: vec![batch, self.num_patches + 1, width],
                got: dims,
            });
        }

        // fill the hidden positions with mask tokens, then unshuffle
        let missing = self.num_patches + 1 - seq;
        let patches = latent_patches(&x, seq)?;
        let shuffled = if missing == 0 {
            patches
        } else {
            let mask_token = params.get(&format!("{path}.mask_token"))?;
            let token_refs: Vec<&Tensor> =
                std::iter::repeat(mask_token).take(batch * missing).collect();
            let mask_tokens = Tensor::cat(&token_refs, 0)?.reshape(&[
                batch as isize,
                missing as isize,
                width as isize,
            ])?;
            Tensor::cat(&[&patches, &mask_tokens], 1)?
        };
        let index = expand_restore_index(ids_restore, width)?;
        let restored = shuffled.gather(1, &index)?;

        let cls = x.narrow(1, 0, 1)?;
        let x = Tensor::cat(&[&cls, &restored], 1)?;
        let mut x = x.add(&self.pos_table)?;

        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(
                params,
                &format!("{path}.blocks.{i}"),
                &x,
                train,
                drop_key.fold_in(i as u64),
                path_key.fold_in(i as u64),
            )?;
        }
        let x = self.norm.forward(params, &format!("{path}.norm"), &x)?;
        let x = self.pred.forward(params, &format!("{path}.pred"), &x)?;

        // drop the class row: predictions cover exactly the patch grid
        x.narrow(1, 1, self.num_patches)
    }
}

/// Strip the class token from the embedded latent.
fn latent_patches(x: &Tensor, seq: usize) -> Result<Tensor> {
    x.narrow(1, 1, seq - 1)
}

/// Broadcast a `(B, L)` restore permutation over the channel axis so it can
/// gather `(B, L, width)` rows.
fn expand_restore_index(ids_restore: &Tensor, width: usize) -> Result<Tensor> {
    let data = ids_restore.contiguous();
    let src = data.as_i64_slice().ok_or_else(|| VeilError::DTypeMismatch {
        expected: DType::I64,
        got: ids_restore.dtype(),
    })?;
    let dims = ids_restore.shape().dims();
    let mut out = Vec::with_capacity(src.len() * width);
    for &idx in src {
        out.extend(std::iter::repeat(idx).take(width));
    }
    Ok(Tensor::from_i64(&out, &[dims[0], dims[1], width]))
}
