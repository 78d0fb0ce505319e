//! # veil-core
//!
//! Core tensor engine for the Veil MAE framework.
//!
//! Provides the foundational `Tensor` type with:
//! - F32 compute tensors and I64 index tensors
//! - Zero-copy views (reshape, transpose)
//! - Broadcasting elementwise ops, matmul, reductions, gather/argsort
//! - Explicit splittable PRNG keys (no global random state)

pub mod device;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod rng;
pub mod shape;
pub mod storage;
pub mod tensor;

pub use device::Device;
pub use dtype::DType;
pub use error::VeilError;
pub use rng::PrngKey;
pub use shape::Shape;
pub use storage::Storage;
pub use tensor::Tensor;

pub type Result<T> = std::result::Result<T, VeilError>;
