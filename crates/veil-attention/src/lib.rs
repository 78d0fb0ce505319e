//! # veil-attention
//!
//! Scaled dot-product attention primitives.

pub mod scaled_dot;

pub use scaled_dot::scaled_dot_product_attention;
