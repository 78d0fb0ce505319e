//! Masked-autoencoder pretraining core.
//!
//! A [`MAEViT`] splits images into patches, hides most of them, encodes the
//! visible remainder with a vision transformer and reconstructs the full
//! patch grid from the latent. [`MAEClassifier`] reuses the pretrained
//! encoder for fine-tuning. The `loss` module holds the training objectives
//! and `checkpoint` the safetensors persistence.

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod loss;
pub mod masking;
pub mod model;

pub use checkpoint::{checkpoint_path, load_checkpoint, save_checkpoint};
pub use classifier::MAEClassifier;
pub use config::{ClassifierConfig, MAEConfig, MaskStrategyKind};
pub use decoder::MAEDecoder;
pub use encoder::MAEEncoder;
pub use loss::{
    info_nce, mae_cls_loss, mae_contrastive_loss, mae_loss, mae_norm_pix_loss,
    mae_supervised_contrastive_loss, masked_mean_squared_error,
};
pub use masking::{MaskOutcome, MaskStrategy};
pub use model::MAEViT;
