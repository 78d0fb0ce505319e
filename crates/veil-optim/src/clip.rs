//! Gradient clipping over a parameter blob.

use veil_core::{Result, Tensor, VeilError};
use veil_nn::Params;

/// Clip gradients by global L2 norm across the whole blob.
///
/// Scales every gradient so the total L2 norm does not exceed `max_norm`.
/// Returns the original total norm before clipping.
pub fn clip_grad_norm_(grads: &mut Params, max_norm: f32) -> Result<f32> {
    let mut total_norm_sq = 0.0f32;
    for (_, g) in grads.iter() {
        let c = g.contiguous();
        let data = c.as_f32_slice().ok_or(VeilError::UnsupportedDType(g.dtype()))?;
        total_norm_sq += data.iter().map(|v| v * v).sum::<f32>();
    }
    let total_norm = total_norm_sq.sqrt();

    if total_norm > max_norm {
        let scale = max_norm / (total_norm + 1e-6);
        let mut scaled: Vec<(String, Tensor)> = Vec::new();
        for (path, g) in grads.iter() {
            scaled.push((path.clone(), g.mul_scalar(scale)?));
        }
        for (path, tensor) in scaled {
            grads.insert(path, tensor);
        }
    }

    Ok(total_norm)
}

/// Clip every gradient element to [-clip_value, clip_value].
pub fn clip_grad_value_(grads: &mut Params, clip_value: f32) -> Result<()> {
    let mut clipped: Vec<(String, Tensor)> = Vec::new();
    for (path, g) in grads.iter() {
        clipped.push((path.clone(), g.clamp(-clip_value, clip_value)?));
    }
    for (path, tensor) in clipped {
        grads.insert(path, tensor);
    }
    Ok(())
}
