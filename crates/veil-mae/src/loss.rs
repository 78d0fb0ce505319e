//! Training objectives: masked reconstruction, classification and InfoNCE.
//!
//! Every objective consumes one step key, splits it into a carried key plus
//! sub-keys for dropout, drop path and masking, and hands the carried key
//! back so the training loop can thread it through steps.

use veil_core::{PrngKey, Result, Tensor, VeilError};
use veil_nn::{accuracy, one_hot, softmax_cross_entropy, Params};
use veil_vit::patchify;

use crate::classifier::MAEClassifier;
use crate::model::MAEViT;

/// Per-step key split shared by all objectives.
fn split_step_key(key: PrngKey) -> (PrngKey, PrngKey, PrngKey, PrngKey) {
    let keys = key.split_n(4);
    (keys[0], keys[1], keys[2], keys[3])
}

/// Read a scalar tensor's single value.
fn scalar(t: &Tensor) -> Result<f32> {
    t.get_f32(0)
        .ok_or_else(|| VeilError::InvalidArgument("scalar read on empty tensor".into()))
}

/// Mean squared error over hidden patches only.
///
/// `pred` and `target` are `(B, L, patch_dim)`; `mask` is `(B, L)` with 1 at
/// hidden positions. Per-patch errors are averaged over the patch width, then
/// averaged over exactly the masked entries. A mask that hides nothing is an
/// error: the objective would be vacuous.
pub fn masked_mean_squared_error(pred: &Tensor, target: &Tensor, mask: &Tensor) -> Result<f32> {
    if pred.shape() != target.shape() {
        return Err(VeilError::ShapeMismatch {
            expected: target.shape().dims().to_vec(),
            got: pred.shape().dims().to_vec(),
        });
    }

    let diff = pred.sub(target)?;
    let per_patch = diff.mul(&diff)?.mean_axis(2)?;
    let masked = scalar(&per_patch.mul(mask)?.sum()?)?;
    let count = scalar(&mask.sum()?)?;
    if count == 0.0 {
        return Err(VeilError::InvalidArgument("masked loss: mask hides no patches".into()));
    }
    Ok(masked / count)
}

/// Reconstruction loss against raw pixel targets.
pub fn mae_loss(
    model: &MAEViT,
    params: &Params,
    images: &Tensor,
    mask_ratio: f32,
    train: bool,
    key: PrngKey,
) -> Result<(f32, PrngKey)> {
    let (carry, drop_key, path_key, mask_key) = split_step_key(key);
    let target = patchify(images, model.config.patch_size)?;
    let (pred, mask) =
        model.forward_with_keys(params, images, mask_ratio, train, drop_key, path_key, mask_key)?;
    let loss = masked_mean_squared_error(&pred, &target, &mask)?;
    Ok((loss, carry))
}

/// Reconstruction loss against per-patch normalized pixel targets.
///
/// Each target patch is shifted and scaled by its own mean and biased
/// variance before the comparison, so the objective rewards structure rather
/// than absolute intensity.
pub fn mae_norm_pix_loss(
    model: &MAEViT,
    params: &Params,
    images: &Tensor,
    mask_ratio: f32,
    train: bool,
    key: PrngKey,
) -> Result<(f32, PrngKey)> {
    let (carry, drop_key, path_key, mask_key) = split_step_key(key);

    let target = patchify(images, model.config.patch_size)?;
    let dims = target.shape().dims().to_vec();
    let col = [dims[0] as isize, dims[1] as isize, 1];
    let mean = target.mean_axis(2)?.reshape(&col)?;
    let var = target.var_axis(2)?.reshape(&col)?;
    let target = target.sub(&mean)?.div(&var.add_scalar(1e-6)?.sqrt()?)?;

    let (pred, mask) =
        model.forward_with_keys(params, images, mask_ratio, train, drop_key, path_key, mask_key)?;
    let loss = masked_mean_squared_error(&pred, &target, &mask)?;
    Ok((loss, carry))
}

/// Cross-entropy and exact-match accuracy for the fine-tuning classifier.
///
/// `labels` are class indices `(B,)`, I64.
pub fn mae_cls_loss(
    classifier: &MAEClassifier,
    params: &Params,
    images: &Tensor,
    labels: &Tensor,
    mask_ratio: f32,
    train: bool,
    key: PrngKey,
) -> Result<(f32, f32, PrngKey)> {
    let (carry, drop_key, path_key, mask_key) = split_step_key(key);
    let logits = classifier
        .forward_with_keys(params, images, mask_ratio, train, drop_key, path_key, mask_key)?;
    let targets = one_hot(labels, classifier.config.num_classes)?;
    let loss = scalar(&softmax_cross_entropy(&logits, &targets)?)?;
    let acc = scalar(&accuracy(&logits, &targets)?)?;
    Ok((loss, acc, carry))
}

/// InfoNCE over a feature batch holding two augmented views.
///
/// `features` is `(2N, F)` with the second view stacked under the first, so
/// row `i` pairs with row `(i + N) mod 2N`. Rows are compared by cosine
/// similarity scaled by `temperature`; each row's own similarity is pushed to
/// -9e15 before the log-sum-exp so it never competes with the positive.
pub fn info_nce(features: &Tensor, temperature: f32) -> Result<f32> {
    let dims = features.shape().dims().to_vec();
    if dims.len() != 2 {
        return Err(VeilError::ShapeMismatch { expected: vec![0, 0], got: dims });
    }
    let (rows, width) = (dims[0], dims[1]);
    if rows < 2 || rows % 2 != 0 {
        return Err(VeilError::InvalidArgument(format!(
            "info_nce: feature batch of {rows} rows cannot be split into two views"
        )));
    }
    if temperature <= 0.0 {
        return Err(VeilError::InvalidArgument(format!(
            "info_nce: temperature {temperature} must be positive"
        )));
    }

    let data = features.contiguous();
    let src = data.as_f32_slice().ok_or(VeilError::UnsupportedDType(features.dtype()))?;

    let mut unit = vec![0.0f32; rows * width];
    for r in 0..rows {
        let row = &src[r * width..(r + 1) * width];
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-8);
        for (dst, &v) in unit[r * width..(r + 1) * width].iter_mut().zip(row) {
            *dst = v / norm;
        }
    }

    let half = rows / 2;
    let mut total = 0.0f64;
    let mut sim = vec![0.0f32; rows];
    for i in 0..rows {
        for (j, slot) in sim.iter_mut().enumerate() {
            if j == i {
                *slot = -9e15;
                continue;
            }
            let dot: f32 = unit[i * width..(i + 1) * width]
                .iter()
                .zip(&unit[j * width..(j + 1) * width])
                .map(|(a, b)| a * b)
                .sum();
            *slot = dot / temperature;
        }

        let row_max = sim.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let lse = row_max + sim.iter().map(|&s| (s - row_max).exp()).sum::<f32>().ln();
        let positive = sim[(i + half) % rows];
        total += f64::from(lse - positive);
    }

    Ok((total / rows as f64) as f32)
}

/// Self-supervised contrastive objective over two views of each image.
///
/// Both views run through the autoencoder with the same keys; the per-image
/// feature is the reconstruction restricted to visible patches, flattened to
/// one row.
#[allow(clippy::too_many_arguments)]
pub fn mae_contrastive_loss(
    model: &MAEViT,
    params: &Params,
    view_a: &Tensor,
    view_b: &Tensor,
    mask_ratio: f32,
    temperature: f32,
    train: bool,
    key: PrngKey,
) -> Result<(f32, PrngKey)> {
    let (carry, drop_key, path_key, mask_key) = split_step_key(key);

    let images = Tensor::cat(&[view_a, view_b], 0)?;
    let (pred, mask) =
        model.forward_with_keys(params, &images, mask_ratio, train, drop_key, path_key, mask_key)?;

    let dims = pred.shape().dims().to_vec();
    let mask_col = mask.reshape(&[dims[0] as isize, dims[1] as isize, 1])?;
    let visible_weight = Tensor::ones(mask_col.shape().dims()).sub(&mask_col)?;
    let features = pred
        .mul(&visible_weight)?
        .reshape(&[dims[0] as isize, (dims[1] * dims[2]) as isize])?;

    let loss = info_nce(&features, temperature)?;
    Ok((loss, carry))
}

/// Label-aware contrastive pretraining. Not supported.
pub fn mae_supervised_contrastive_loss(
    _model: &MAEViT,
    _params: &Params,
    _images: &Tensor,
    _labels: &Tensor,
    _mask_ratio: f32,
    _train: bool,
    _key: PrngKey,
) -> Result<(f32, PrngKey)> {
    Err(VeilError::NotImplemented("supervised contrastive loss"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MAEClassifier;
    use crate::config::{ClassifierConfig, MAEConfig};
    use crate::model::MAEViT;
    use veil_core::PrngKey;

    #[test]
    fn test_masked_mse_zero_on_perfect_reconstruction() {
        let pred = PrngKey::new(0).uniform(&[2, 8, 6]);
        let mask = Tensor::from_f32(&[1.0; 16], &[2, 8]);
        let loss = masked_mean_squared_error(&pred, &pred, &mask).unwrap();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_masked_mse_all_visible_is_error() {
        let pred = PrngKey::new(0).uniform(&[1, 4, 3]);
        let mask = Tensor::zeros(&[1, 4], veil_core::DType::F32);
        assert!(masked_mean_squared_error(&pred, &pred, &mask).is_err());
    }

    #[test]
    fn test_masked_mse_ignores_visible_patches() {
        let target = Tensor::zeros(&[1, 2, 3], veil_core::DType::F32);
        // patch 0 visible and wrong, patch 1 hidden and exact
        let pred = Tensor::from_f32(&[9.0, 9.0, 9.0, 0.0, 0.0, 0.0], &[1, 2, 3]);
        let mask = Tensor::from_f32(&[0.0, 1.0], &[1, 2]);
        let loss = masked_mean_squared_error(&pred, &target, &mask).unwrap();
        assert_eq!(loss, 0.0);

        // now hide the wrong patch instead
        let mask = Tensor::from_f32(&[1.0, 0.0], &[1, 2]);
        let loss = masked_mean_squared_error(&pred, &target, &mask).unwrap();
        assert!((loss - 81.0).abs() < 1e-4);
    }

    #[test]
    fn test_mae_loss_runs() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[2, 3, 16, 16]);
        let (loss, carry) = mae_loss(&model, &params, &images, 0.5, true, PrngKey::new(2)).unwrap();
        assert!(loss.is_finite() && loss >= 0.0);
        assert_ne!(carry, PrngKey::new(2));
    }

    #[test]
    fn test_mae_loss_deterministic_under_key() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[1, 3, 16, 16]);
        let (a, _) = mae_loss(&model, &params, &images, 0.5, true, PrngKey::new(7)).unwrap();
        let (b, _) = mae_loss(&model, &params, &images, 0.5, true, PrngKey::new(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_norm_pix_loss_runs() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[1, 3, 16, 16]);
        let (loss, _) =
            mae_norm_pix_loss(&model, &params, &images, 0.5, false, PrngKey::new(2)).unwrap();
        assert!(loss.is_finite() && loss >= 0.0);
    }

    #[test]
    fn test_cls_loss_and_accuracy_range() {
        let clf = MAEClassifier::new(ClassifierConfig {
            backbone: MAEConfig::tiny(),
            num_classes: 10,
            head_hidden_dim: 32,
            global_pool: false,
        })
        .unwrap();
        let params = clf.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[4, 3, 16, 16]);
        let labels = Tensor::from_i64(&[0, 3, 7, 9], &[4]);
        let (loss, acc, _) =
            mae_cls_loss(&clf, &params, &images, &labels, 0.0, false, PrngKey::new(2)).unwrap();
        assert!(loss.is_finite() && loss > 0.0);

        // masked fine-tuning: the encoder drops patches but the head still
        // sees a full-width feature
        let (masked_loss, _, _) =
            mae_cls_loss(&clf, &params, &images, &labels, 0.5, true, PrngKey::new(3)).unwrap();
        assert!(masked_loss.is_finite() && masked_loss > 0.0);
        assert!((0.0..=1.0).contains(&acc));
    }

    #[test]
    fn test_info_nce_rewards_matching_views() {
        // rows 0/1 duplicated at offset 2: each positive has cosine sim 1
        let features = Tensor::from_f32(
            &[
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0,
            ],
            &[4, 4],
        );
        let loss = info_nce(&features, 0.1).unwrap();
        assert!(loss < 0.01, "aligned views should give near-zero loss, got {loss}");
    }

    #[test]
    fn test_info_nce_mismatched_views_cost_more() {
        let aligned = Tensor::from_f32(
            &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0],
            &[4, 2],
        );
        // positives orthogonal to their anchors
        let misaligned = Tensor::from_f32(
            &[1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
            &[4, 2],
        );
        let low = info_nce(&aligned, 0.5).unwrap();
        let high = info_nce(&misaligned, 0.5).unwrap();
        assert!(low < high);
    }

    #[test]
    fn test_info_nce_rejects_odd_batch() {
        let features = PrngKey::new(0).uniform(&[3, 4]);
        assert!(info_nce(&features, 0.1).is_err());
    }

    #[test]
    fn test_info_nce_rejects_bad_temperature() {
        let features = PrngKey::new(0).uniform(&[4, 4]);
        assert!(info_nce(&features, 0.0).is_err());
        assert!(info_nce(&features, -1.0).is_err());
    }

    #[test]
    fn test_contrastive_loss_runs() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));
        let view_a = PrngKey::new(1).uniform(&[2, 3, 16, 16]);
        let view_b = view_a.add_scalar(0.01).unwrap();
        let (loss, _) = mae_contrastive_loss(
            &model,
            &params,
            &view_a,
            &view_b,
            0.5,
            0.1,
            false,
            PrngKey::new(2),
        )
        .unwrap();
        assert!(loss.is_finite());
    }

    #[test]
    fn test_supervised_contrastive_not_implemented() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[2, 3, 16, 16]);
        let labels = Tensor::from_i64(&[0, 1], &[2]);
        let err = mae_supervised_contrastive_loss(
            &model,
            &params,
            &images,
            &labels,
            0.5,
            false,
            PrngKey::new(2),
        );
        assert!(matches!(err, Err(VeilError::NotImplemented(_))));
    }
}
