//! Full masked autoencoder: encoder + decoder assembly.

use veil_core::{PrngKey, Result, Tensor};
use veil_nn::Params;
use veil_vit::unpatchify;

use crate::config::MAEConfig;
use crate::decoder::MAEDecoder;
use crate::encoder::MAEEncoder;

/// The complete masked autoencoder.
///
/// The struct is an immutable architecture descriptor; `init_params` creates
/// the parameter blob and every forward borrows it read-only, so a blob can
/// be swapped, checkpointed or partially reused (e.g. encoder-only for the
/// classifier) without touching the model.
#[derive(Debug, Clone)]
pub struct MAEViT {
    pub config: MAEConfig,
    encoder: MAEEncoder,
    decoder: MAEDecoder,
}

impl MAEViT {
    pub fn new(config: MAEConfig) -> Result<Self> {
        let encoder = MAEEncoder::new(&config)?;
        let decoder = MAEDecoder::new(&config)?;
        Ok(Self { config, encoder, decoder })
    }

    pub fn encoder(&self) -> &MAEEncoder {
        &self.encoder
    }

    /// Create a fresh parameter blob for this architecture.
    pub fn init_params(&self, key: PrngKey) -> Params {
        let mut params = Params::new();
        self.encoder.init(key.fold_in(0), &mut params, "encoder");
        self.decoder.init(key.fold_in(1), &mut params, "decoder");
        params
    }

    /// Run the autoencoder with explicit sub-keys for each stochastic site.
    ///
    /// Returns reconstructed patches `(B, L, patch_dim)` and the binary mask
    /// `(B, L)`.
    pub fn forward_with_keys(
        &self,
        params: &Params,
        images: &Tensor,
        mask_ratio: f32,
        train: bool,
        dropout_key: PrngKey,
        drop_path_key: PrngKey,
        mask_key: PrngKey,
    ) -> Result<(Tensor, Tensor)> {
        let (latent, mask, ids_restore) = self.encoder.forward(
            params,
            "encoder",
            images,
            mask_ratio,
            train,
            mask_key,
            dropout_key.fold_in(0),
            drop_path_key.fold_in(0),
        )?;
        let pred = self.decoder.forward(
            params,
            "decoder",
            &latent,
            &ids_restore,
            train,
            dropout_key.fold_in(1),
            drop_path_key.fold_in(1),
        )?;
        Ok((pred, mask))
    }

    /// Convenience wrapper deriving the three sub-keys from one key.
    pub fn forward(
        &self,
        params: &Params,
        images: &Tensor,
        mask_ratio: f32,
        train: bool,
        key: PrngKey,
    ) -> Result<(Tensor, Tensor)> {
        self.forward_with_keys(
            params,
            images,
            mask_ratio,
            train,
            key.fold_in(0),
            key.fold_in(1),
            key.fold_in(2),
        )
    }

    /// Reassemble decoder output into image space for visualization.
    pub fn reconstruct_images(&self, pred: &Tensor) -> Result<Tensor> {
        unpatchify(pred, self.config.patch_size)
    }

    /// Composite of predicted hidden patches over the original visible ones:
    /// `pred * mask + target * (1 - mask)`.
    pub fn paste_visible(&self, pred: &Tensor, target: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let dims = mask.shape().dims();
        let mask_col = mask.reshape(&[dims[0] as isize, dims[1] as isize, 1])?;
        let ones = Tensor::ones(mask_col.shape().dims());
        let inv = ones.sub(&mask_col)?;
        pred.mul(&mask_col)?.add(&target.mul(&inv)?)
    }
}
