//! # veil-vit
//!
//! Vision Transformer building blocks: the patch codec, fixed sinusoidal
//! position embeddings, patch embedding, multi-head attention and the
//! pre-norm transformer block.

pub mod block;
pub mod feed_forward;
pub mod mha;
pub mod patch_embed;
pub mod patches;
pub mod pos_embed;

pub use block::Block;
pub use feed_forward::Mlp;
pub use mha::MultiHeadAttention;
pub use patch_embed::PatchEmbed;
pub use patches::{patchify, unpatchify};
pub use pos_embed::sincos_position_embedding;
