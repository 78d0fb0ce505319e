//! Patch codec: reversible reshape between images and patch sequences.
//!
//! A `(B, C, H, W)` batch becomes `(B, L, p*p*C)` with patches ordered
//! row-major over the grid and each patch interior flattened in
//! (row, col, channel) order, channel fastest. `unpatchify` is the exact
//! inverse; both are pure reshapes, no interpolation.

use veil_core::{Result, Tensor, VeilError};

/// Split a `(B, C, H, W)` image batch into `(B, L, p*p*C)` patch sequences.
pub fn patchify(images: &Tensor, patch_size: usize) -> Result<Tensor> {
    let dims = images.shape().dims();
    if dims.len() != 4 {
        return Err(VeilError::ShapeMismatch { expected: vec![0, 0, 0, 0], got: dims.to_vec() });
    }
    let (batch, channels, height, width) = (dims[0], dims[1], dims[2], dims[3]);
    if height != width {
        return Err(VeilError::InvalidArgument(format!(
            "patchify: image must be square, got {height}x{width}"
        )));
    }
    if patch_size == 0 || height % patch_size != 0 {
        return Err(VeilError::InvalidArgument(format!(
            "patchify: patch size {patch_size} does not divide image size {height}"
        )));
    }

    let p = patch_size;
    let grid = height / p;
    let num_patches = grid * grid;
    let patch_dim = p * p * channels;

    let data = images.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(images.dtype()))?;
    let mut out = vec![0.0f32; batch * num_patches * patch_dim];

    for b in 0..batch {
        let img = &src[b * channels * height * width..];
        for gh in 0..grid {
            for gw in 0..grid {
                let l = gh * grid + gw;
                let patch = &mut out[(b * num_patches + l) * patch_dim..][..patch_dim];
                for pr in 0..p {
                    for pc in 0..p {
                        for c in 0..channels {
                            let pixel = img[c * height * width + (gh * p + pr) * width + gw * p + pc];
                            patch[(pr * p + pc) * channels + c] = pixel;
                        }
                    }
                }
            }
        }
    }

    Ok(Tensor::from_f32(&out, &[batch, num_patches, patch_dim]))
}

/// Reassemble `(B, L, p*p*C)` patch sequences into `(B, C, H, W)` images.
///
/// `L` must be a perfect square and the patch width must be a multiple of
/// `p*p`.
pub fn unpatchify(patches: &Tensor, patch_size: usize) -> Result<Tensor> {
    let dims = patches.shape().dims();
    if dims.len() != 3 {
        return Err(VeilError::ShapeMismatch { expected: vec![0, 0, 0], got: dims.to_vec() });
    }
    let (batch, num_patches, patch_dim) = (dims[0], dims[1], dims[2]);

    let grid = (num_patches as f64).sqrt() as usize;
    if grid * grid != num_patches {
        return Err(VeilError::InvalidArgument(format!(
            "unpatchify: sequence length {num_patches} is not a perfect square"
        )));
    }

    let p = patch_size;
    if p == 0 || patch_dim % (p * p) != 0 {
        return Err(VeilError::InvalidArgument(format!(
            "unpatchify: patch width {patch_dim} is not a multiple of {}",
            p * p
        )));
    }
    let channels = patch_dim / (p * p);
    let side = grid * p;

    let data = patches.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(patches.dtype()))?;
    let mut out = vec![0.0f32; batch * channels * side * side];

    for b in 0..batch {
        let img = &mut out[b * channels * side * side..][..channels * side * side];
        for gh in 0..grid {
            for gw in 0..grid {
                let l = gh * grid + gw;
                let patch = &src[(b * num_patches + l) * patch_dim..][..patch_dim];
                for pr in 0..p {
                    for pc in 0..p {
                        for c in 0..channels {
                            img[c * side * side + (gh * p + pr) * side + gw * p + pc] =
                                patch[(pr * p + pc) * channels + c];
                        }
                    }
                }
            }
        }
    }

    Ok(Tensor::from_f32(&out, &[batch, channels, side, side]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{PrngKey, Tensor};

    #[test]
    fn test_roundtrip_exact() {
        let images = PrngKey::new(0).uniform(&[2, 3, 32, 32]);
        let patches = patchify(&images, 4).unwrap();
        assert_eq!(patches.shape().dims(), &[2, 64, 48]);
        let back = unpatchify(&patches, 4).unwrap();
        assert_eq!(back.shape().dims(), images.shape().dims());
        assert_eq!(back.as_f32_slice().unwrap(), images.as_f32_slice().unwrap());
    }

    #[test]
    fn test_patch_ordering() {
        // 1x1x4x4 image, patch 2: patch 0 is the top-left 2x2 block
        let img: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let images = Tensor::from_f32(&img, &[1, 1, 4, 4]);
        let patches = patchify(&images, 2).unwrap();
        assert_eq!(patches.shape().dims(), &[1, 4, 4]);
        let data = patches.as_f32_slice().unwrap();
        // row-major interior: pixels (0,0), (0,1), (1,0), (1,1)
        assert_eq!(&data[0..4], &[0.0, 1.0, 4.0, 5.0]);
        // patch 1 is the top-right block
        assert_eq!(&data[4..8], &[2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_channel_fastest_interior() {
        // 2 channels, 2x2 image, patch 2: channel varies fastest
        let images = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0], &[1, 2, 2, 2]);
        let patches = patchify(&images, 2).unwrap();
        assert_eq!(patches.shape().dims(), &[1, 1, 8]);
        assert_eq!(
            patches.as_f32_slice().unwrap(),
            &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]
        );
    }

    #[test]
    fn test_non_square_image() {
        let images = Tensor::ones(&[1, 3, 32, 16]);
        assert!(patchify(&images, 4).is_err());
    }

    #[test]
    fn test_indivisible_patch_size() {
        let images = Tensor::ones(&[1, 3, 32, 32]);
        assert!(patchify(&images, 5).is_err());
    }

    #[test]
    fn test_unpatchify_non_square_length() {
        let patches = Tensor::ones(&[1, 6, 12]);
        assert!(unpatchify(&patches, 2).is_err());
    }
}
