//! Patch embedding: patchify + linear projection into the model width.

use veil_core::{PrngKey, Result, Tensor, VeilError};
use veil_nn::{Linear, Params};

use crate::patches::patchify;

/// Project each flattened patch of a `(B, C, H, W)` batch to `embed_dim`,
/// producing `(B, L, embed_dim)`.
#[derive(Debug, Clone, Copy)]
pub struct PatchEmbed {
    pub img_size: usize,
    pub patch_size: usize,
    pub in_channels: usize,
    pub embed_dim: usize,
    proj: Linear,
}

impl PatchEmbed {
    pub fn new(
        img_size: usize,
        patch_size: usize,
        in_channels: usize,
        embed_dim: usize,
    ) -> Result<Self> {
        if patch_size == 0 || img_size % patch_size != 0 {
            return Err(VeilError::Config(format!(
                "patch size {patch_size} does not divide image size {img_size}"
            )));
        }
        let patch_dim = patch_size * patch_size * in_channels;
        Ok(Self {
            img_size,
            patch_size,
            in_channels,
            embed_dim,
            proj: Linear::new(patch_dim, embed_dim, true),
        })
    }

    pub fn num_patches(&self) -> usize {
        let grid = self.img_size / self.patch_size;
        grid * grid
    }

    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        self.proj.init(key, params, &format!("{path}.proj"));
    }

    pub fn forward(&self, params: &Params, path: &str, images: &Tensor) -> Result<Tensor> {
        let patches = patchify(images, self.patch_size)?;
        self.proj.forward(params, &format!("{path}.proj"), &patches)
    }
}
