//! Tensor operations, split by concern.

pub mod arithmetic;
pub mod comparison;
pub mod manipulation;
pub mod reduction;
