//! Model configuration and named presets.

use serde::{Deserialize, Serialize};
use veil_core::{Result, VeilError};

/// Which masking strategy the encoder is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskStrategyKind {
    Random,
    Grid,
}

impl MaskStrategyKind {
    /// Parse a strategy name as it appears in config files.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "random" => Ok(Self::Random),
            "grid" => Ok(Self::Grid),
            other => Err(VeilError::Config(format!(
                "unknown masking strategy {other:?}, expected \"random\" or \"grid\""
            ))),
        }
    }
}

/// Static architecture description of the masked autoencoder.
///
/// Immutable after construction; all learnable state lives in a `Params`
/// blob created by the model's `init_params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MAEConfig {
    pub img_size: usize,
    pub patch_size: usize,
    pub in_channels: usize,
    pub embed_dim: usize,
    pub encoder_depth: usize,
    pub encoder_num_heads: usize,
    pub decoder_embed_dim: usize,
    pub decoder_depth: usize,
    pub decoder_num_heads: usize,
    pub mlp_ratio: f32,
    #[serde(default)]
    pub drop_rate: f32,
    #[serde(default)]
    pub drop_path_rate: f32,
    #[serde(default)]
    pub norm_pix_loss: bool,
    pub masking: MaskStrategyKind,
}

impl MAEConfig {
    /// CIFAR-scale preset: 32x32x3 images, patch 4, the smaller encoder.
    pub fn small_arch() -> Self {
        Self {
            img_size: 32,
            patch_size: 4,
            in_channels: 3,
            embed_dim: 128,
            encoder_depth: 3,
            encoder_num_heads: 4,
            decoder_embed_dim: 64,
            decoder_depth: 1,
            decoder_num_heads: 4,
            mlp_ratio: 2.0,
            drop_rate: 0.0,
            drop_path_rate: 0.0,
            norm_pix_loss: false,
            masking: MaskStrategyKind::Random,
        }
    }

    /// CIFAR-scale preset with the wider, deeper encoder.
    pub fn med_arch() -> Self {
        Self {
            embed_dim: 256,
            encoder_depth: 4,
            decoder_embed_dim: 128,
            decoder_depth: 2,
            ..Self::small_arch()
        }
    }

    /// Minimal configuration for unit tests.
    pub fn tiny() -> Self {
        Self {
            img_size: 16,
            patch_size: 4,
            in_channels: 3,
            embed_dim: 32,
            encoder_depth: 1,
            encoder_num_heads: 2,
            decoder_embed_dim: 16,
            decoder_depth: 1,
            decoder_num_heads: 2,
            mlp_ratio: 2.0,
            drop_rate: 0.0,
            drop_path_rate: 0.0,
            norm_pix_loss: false,
            masking: MaskStrategyKind::Random,
        }
    }

    /// Patches per side of the grid.
    pub fn grid_size(&self) -> usize {
        self.img_size / self.patch_size
    }

    /// Total patch count `(img_size / patch_size)^2`.
    pub fn num_patches(&self) -> usize {
        self.grid_size() * self.grid_size()
    }

    /// Width of one flattened patch, `patch_size^2 * channels`.
    pub fn patch_dim(&self) -> usize {
        self.patch_size * self.patch_size * self.in_channels
    }

    /// Check every construction-time invariant.
    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 || self.img_size % self.patch_size != 0 {
            return Err(VeilError::Config(format!(
                "patch size {} does not divide image size {}",
                self.patch_size, self.img_size
            )));
        }
        if self.in_channels == 0 {
            return Err(VeilError::Config("channel count must be positive".into()));
        }
        for (name, dim) in [("embed_dim", self.embed_dim), ("decoder_embed_dim", self.decoder_embed_dim)]
        {
            if dim % 4 != 0 {
                return Err(VeilError::Config(format!("{name} {dim} not divisible by 4")));
            }
        }
        for (name, dim, heads) in [
            ("encoder", self.embed_dim, self.encoder_num_heads),
            ("decoder", self.decoder_embed_dim, self.decoder_num_heads),
        ] {
            if heads == 0 {
                return Err(VeilError::Config(format!("{name} head count must be positive")));
            }
            if dim % heads != 0 {
                return Err(VeilError::Config(format!(
                    "{name} width {dim} not divisible by {heads} heads"
                )));
            }
        }
        if self.encoder_depth == 0 || self.decoder_depth == 0 {
            return Err(VeilError::Config("depth must be positive".into()));
        }
        if self.mlp_ratio <= 0.0 {
            return Err(VeilError::Config(format!("mlp_ratio {} must be positive", self.mlp_ratio)));
        }
        for (name, rate) in [("drop_rate", self.drop_rate), ("drop_path_rate", self.drop_path_rate)]
        {
            if !(0.0..1.0).contains(&rate) {
                return Err(VeilError::Config(format!("{name} {rate} not in [0, 1)")));
            }
        }
        Ok(())
    }
}

/// Configuration for the fine-tuning classifier built on a pretrained
/// encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub backbone: MAEConfig,
    pub num_classes: usize,
    pub head_hidden_dim: usize,
    /// Mean-pool patch tokens instead of reading the class token.
    #[serde(default)]
    pub global_pool: bool,
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        self.backbone.validate()?;
        if self.num_classes == 0 {
            return Err(VeilError::Config("num_classes must be positive".into()));
        }
        if self.head_hidden_dim == 0 {
            return Err(VeilError::Config("head_hidden_dim must be positive".into()));
        }
        Ok(())
    }
}
