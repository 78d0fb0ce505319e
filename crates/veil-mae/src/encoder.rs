//! MAE encoder: patch embedding, masking and the visible-token transformer.

use veil_core::{DType, PrngKey, Result, Tensor};
use veil_nn::{LayerNorm, Params};
use veil_vit::{sincos_position_embedding, Block, PatchEmbed};

use crate::config::MAEConfig;
use crate::masking::{MaskOutcome, MaskStrategy};

/// Encoder half of the masked autoencoder.
///
/// Pipeline: patch-embed -> add position rows 1..N -> mask -> prepend the
/// class token (carrying position row 0) -> N pre-norm blocks -> LayerNorm.
/// The masking strategy is fixed at construction. The position table is
/// computed once here and never trained.
#[derive(Debug, Clone)]
pub struct MAEEncoder {
    pub embed_dim: usize,
    patch_embed: PatchEmbed,
    blocks: Vec<Block>,
    norm: LayerNorm,
    pos_table: Tensor,
    masking: MaskStrategy,
}

impl MAEEncoder {
    pub fn new(config: &MAEConfig) -> Result<Self> {
        config.validate()?;

        let patch_embed =
            PatchEmbed::new(config.img_size, config.patch_size, config.in_channels, config.embed_dim)?;
        let pos_table =
            sincos_position_embedding(patch_embed.num_patches(), config.embed_dim, true)?;

        let mut blocks = Vec::with_capacity(config.encoder_depth);
        for _ in 0..config.encoder_depth {
            blocks.push(Block::new(
                config.embed_dim,
                config.encoder_num_heads,
                config.mlp_ratio,
                true,
                config.drop_rate,
                config.drop_path_rate,
            )?);
        }

        Ok(Self {
            embed_dim: config.embed_dim,
            patch_embed,
            blocks,
            norm: LayerNorm::new(config.embed_dim),
            pos_table,
            masking: MaskStrategy::from(config.masking),
        })
    }

    pub fn num_patches(&self) -> usize {
        self.patch_embed.num_patches()
    }

    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        params.insert(
            format!("{path}.cls_token"),
            Tensor::zeros(&[1, 1, self.embed_dim], DType::F32),
        );
        self.patch_embed.init(key.fold_in(0), params, &format!("{path}.patch_embed"));
        for (i, block) in self.blocks.iter().enumerate() {
            block.init(key.fold_in(1 + i as u64), params, &format!("{path}.blocks.{i}"));
        }
        self.norm.init(params, &format!("{path}.norm"));
    }

    /// Encode an image batch, returning the latent sequence
    /// `(B, 1 + keep, D)` together with the mask and restore permutation.
    pub fn forward(
        &self,
        params: &Params,
        path: &str,
        images: &Tensor,
        mask_ratio: f32,
        train: bool,
        mask_key: PrngKey,
        drop_key: PrngKey,
        path_key: PrngKey,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let num_patches = self.num_patches();

        let x = self.patch_embed.forward(params, &format!("{path}.patch_embed"), images)?;
        let x = x.add(&self.pos_table.narrow(1, 1, num_patches)?)?;

        let MaskOutcome { visible, mask, ids_restore } =
            self.masking.mask(&x, mask_ratio, mask_key)?;

        let cls = params.get(&format!("{path}.cls_token"))?;
        let cls = cls.add(&self.pos_table.narrow(1, 0, 1)?)?;
        let batch = visible.shape().dims()[0];
        let cls_refs: Vec<&Tensor> = std::iter::repeat(&cls).take(batch).collect();
        let cls_tokens = Tensor::cat(&cls_refs, 0)?;

        let mut x = Tensor::cat(&[&cls_tokens, &visible], 1)?;
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

        Ok((x, mask, ids_restore))
    }
}
