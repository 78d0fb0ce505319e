//! Patch masking strategies.
//!
//! Both variants consume an embedded patch sequence `(B, L, D)` and produce
//! the visible subset, a binary mask in original patch order (0 = kept,
//! 1 = hidden), and the restore permutation that maps
//! `[visible-in-shuffled-order, mask-tokens]` back to original order.

use veil_core::{PrngKey, Result, Tensor, VeilError};

use crate::config::MaskStrategyKind;

/// Result of one masking pass over a batch.
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    /// Visible patches `(B, keep, D)`, in shuffled order for the random
    /// strategy and ascending index order for the grid strategy.
    pub visible: Tensor,
    /// Binary mask `(B, L)` in original patch order; 0 = visible, 1 = hidden.
    pub mask: Tensor,
    /// Restore permutation `(B, L)`, I64.
    pub ids_restore: Tensor,
}

/// Closed set of masking strategies, fixed at model construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskStrategy {
    /// Per-sample uniform shuffle; keeps `floor(L * (1 - ratio))` patches.
    Random,
    /// Deterministic row/column lattice; ratio must be 0.5 or 0.75.
    Grid,
}

impl From<MaskStrategyKind> for MaskStrategy {
    fn from(kind: MaskStrategyKind) -> Self {
        match kind {
            MaskStrategyKind::Random => Self::Random,
            MaskStrategyKind::Grid => Self::Grid,
        }
    }
}

impl MaskStrategy {
    /// Mask a `(B, L, D)` patch sequence.
    ///
    /// The key is split into one independent sub-key per sample; the grid
    /// strategy ignores it.
    pub fn mask(&self, x: &Tensor, mask_ratio: f32, key: PrngKey) -> Result<MaskOutcome> {
        let dims = x.shape().dims().to_vec();
        if dims.len() != 3 {
            return Err(VeilError::ShapeMismatch { expected: vec![0, 0, 0], got: dims });
        }
        if dims[0] == 0 {
            return Err(VeilError::InvalidArgument("masking: empty batch".into()));
        }
        if !(0.0..1.0).contains(&mask_ratio) {
            return Err(VeilError::InvalidArgument(format!(
                "mask ratio {mask_ratio} not in [0, 1)"
            )));
        }

        match self {
            Self::Random => random_masking(x, mask_ratio, key),
            Self::Grid => grid_masking(x, mask_ratio),
        }
    }
}

fn random_masking(x: &Tensor, mask_ratio: f32, key: PrngKey) -> Result<MaskOutcome> {
    let dims = x.shape().dims();
    let (batch, len, width) = (dims[0], dims[1], dims[2]);
    let keep = (len as f32 * (1.0 - mask_ratio)) as usize;

    let data = x.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;

    let keys = key.split_n(batch);
    let mut visible = vec![0.0f32; batch * keep * width];
    let mut mask = vec![1.0f32; batch * len];
    let mut restore = vec![0i64; batch * len];

    for b in 0..batch {
        let noise = keys[b].uniform(&[len]);
        let ids_shuffle = noise.argsort()?;
        let ids_restore = ids_shuffle.argsort()?;
        let shuffle = ids_shuffle.as_i64_slice().unwrap();
        let restore_b = ids_restore.as_i64_slice().unwrap();

        for (j, &src_idx) in shuffle[..keep].iter().enumerate() {
            let dst = &mut visible[(b * keep + j) * width..][..width];
            dst.copy_from_slice(&src[(b * len + src_idx as usize) * width..][..width]);
        }

        // mask is 0 for the first `keep` entries in shuffled order, then
        // carried back to original order through the restore permutation
        for i in 0..len {
            if (restore_b[i] as usize) < keep {
                mask[b * len + i] = 0.0;
            }
        }
        restore[b * len..(b + 1) * len].copy_from_slice(restore_b);
    }

    Ok(MaskOutcome {
        visible: Tensor::from_f32(&visible, &[batch, keep, width]),
        mask: Tensor::from_f32(&mask, &[batch, len]),
        ids_restore: Tensor::from_i64(&restore, &[batch, len]),
    })
}

fn grid_masking(x: &Tensor, mask_ratio: f32) -> Result<MaskOutcome> {
    if mask_ratio != 0.5 && mask_ratio != 0.75 {
        return Err(VeilError::InvalidArgument(format!(
            "grid masking supports ratios 0.5 and 0.75, got {mask_ratio}"
        )));
    }

    let dims = x.shape().dims();
    let (batch, len, width) = (dims[0], dims[1], dims[2]);
    let grid = (len as f64).sqrt() as usize;
    if grid * grid != len {
        return Err(VeilError::InvalidArgument(format!(
            "grid masking requires a square patch grid, got {len} patches"
        )));
    }

    let keep_stride = ((1.0 / (1.0 - mask_ratio)) as usize) / 2;
    let mut ids_keep = Vec::new();
    for row in (0..grid).step_by(2) {
        for col in (0..grid).step_by(keep_stride) {
            ids_keep.push(row * grid + col);
        }
    }

    let data = x.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(x.dtype()))?;

    let keep = ids_keep.len();
    let mut visible = vec![0.0f32; batch * keep * width];
    let mut mask = vec![1.0f32; batch * len];

    for b in 0..batch {
        for (j, &idx) in ids_keep.iter().enumerate() {
            let dst = &mut visible[(b * keep + j) * width..][..width];
            dst.copy_from_slice(&src[(b * len + idx) * width..][..width]);
            mask[b * len + idx] = 0.0;
        }
    }

    // kept indices are marked in original order, so restore is the identity
    let identity: Vec<i64> = (0..batch as i64 * len as i64).map(|i| i % len as i64).collect();

    Ok(MaskOutcome {
        visible: Tensor::from_f32(&visible, &[batch, keep, width]),
        mask: Tensor::from_f32(&mask, &[batch, len]),
        ids_restore: Tensor::from_i64(&identity, &[batch, len]),
    })
}
