//! Fixed 2-D sinusoidal position embeddings.

use veil_core::{Result, Tensor, VeilError};

/// Build the `(1, num_patches(+1), embed_dim)` position table for a square
/// patch grid.
///
/// The embedding dimension is split in half: the first half encodes the
/// patch's grid row, the second its grid column. Each half interleaves
/// sine and cosine of geometrically spaced frequencies. With `cls_token`
/// set, an all-zero row is prepended at index 0.
///
/// Deterministic; the owning model computes this once and never trains it.
pub fn sincos_position_embedding(
    num_patches: usize,
    embed_dim: usize,
    cls_token: bool,
) -> Result<Tensor> {
    if embed_dim % 4 != 0 {
        return Err(VeilError::Config(format!(
            "position embedding requires embed_dim divisible by 4, got {embed_dim}"
        )));
    }
    let grid = (num_patches as f64).sqrt() as usize;
    if grid * grid != num_patches {
        return Err(VeilError::Config(format!(
            "position embedding requires a square patch grid, got {num_patches} patches"
        )));
    }

    let half = embed_dim / 2;
    let rows = num_patches + usize::from(cls_token);
    let mut table = vec![0.0f32; rows * embed_dim];
    let offset = usize::from(cls_token);

    for l in 0..num_patches {
        let row_pos = (l / grid) as f32;
        let col_pos = (l % grid) as f32;
        let out = &mut table[(l + offset) * embed_dim..][..embed_dim];
        fill_1d_sincos(&mut out[..half], row_pos);
        fill_1d_sincos(&mut out[half..], col_pos);
    }

    Ok(Tensor::from_f32(&table, &[1, rows, embed_dim]))
}

/// Interleaved sin/cos of `pos` at frequencies `10000^(-2k/dim)`.
fn fill_1d_sincos(out: &mut [f32], pos: f32) {
    let dim = out.len();
    for k in 0..dim / 2 {
        let omega = 1.0 / 10000f32.powf(2.0 * k as f32 / dim as f32);
        out[2 * k] = (pos * omega).sin();
        out[2 * k + 1] = (pos * omega).cos();
    }
}
