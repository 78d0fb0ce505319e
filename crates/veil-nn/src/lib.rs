//! # veil-nn
//!
//! Parameter blobs and functional neural-network layers.
//!
//! Layers in Veil are immutable descriptors; all learnable state lives in a
//! [`Params`] blob keyed by dotted path. A layer's `init` writes its tensors
//! into the blob under a path prefix, and `forward` reads them back, so the
//! whole model's state is a single flat map that optimizers and checkpoints
//! can treat uniformly.

pub mod activations;
pub mod drop_path;
pub mod dropout;
pub mod init;
pub mod layer_norm;
pub mod linear;
pub mod loss;
pub mod params;
pub mod serialization;

pub use activations::gelu;
pub use drop_path::drop_path;
pub use dropout::dropout;
pub use layer_norm::LayerNorm;
pub use linear::Linear;
pub use loss::{accuracy, one_hot, softmax_cross_entropy};
pub use params::Params;
pub use serialization::{load_params, save_params};
