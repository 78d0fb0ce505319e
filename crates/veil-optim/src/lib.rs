//! # veil-optim
//!
//! Optimizers and learning rate schedulers operating on `Params` blobs.

pub mod adam;
pub mod clip;
pub mod scheduler;
pub mod sgd;

pub use adam::{Adam, ParamGroup};
pub use clip::{clip_grad_norm_, clip_grad_value_};
pub use scheduler::{CosineAnnealing, LrScheduler, WarmupCosine};
pub use sgd::SGD;
