//! Classification losses over one-hot targets.

use veil_core::{DType, Result, Tensor, VeilError};

/// Expand class indices `[B]` (I64) into a one-hot matrix `[B, num_classes]`.
pub fn one_hot(labels: &Tensor, num_classes: usize) -> Result<Tensor> {
    if labels.dtype() != DType::I64 {
        return Err(VeilError::DTypeMismatch { expected: DType::I64, got: labels.dtype() });
    }
    if labels.ndim() != 1 {
        return Err(VeilError::ShapeMismatch {
            expected: vec![labels.numel()],
            got: labels.shape().dims().to_vec(),
        });
    }

    let data = labels.contiguous();
    let idx = data.as_i64_slice().unwrap();
    let batch = idx.len();
    let mut out = vec![0.0f32; batch * num_classes];

    for (b, &label) in idx.iter().enumerate() {
        if label < 0 || label as usize >= num_classes {
            return Err(VeilError::InvalidArgument(format!(
                "one_hot: label {label} out of range for {num_classes} classes"
            )));
        }
        out[b * num_classes + label as usize] = 1.0;
    }

    Ok(Tensor::from_f32(&out, &[batch, num_classes]))
}

/// Mean cross-entropy between logits `[B, C]` and one-hot targets `[B, C]`.
pub fn softmax_cross_entropy(logits: &Tensor, targets_one_hot: &Tensor) -> Result<Tensor> {
    if logits.shape() != targets_one_hot.shape() {
        return Err(VeilError::ShapeMismatch {
            expected: logits.shape().dims().to_vec(),
            got: targets_one_hot.shape().dims().to_vec(),
        });
    }
    let log_probs = logits.log_softmax(-1)?;
    let weighted = log_probs.mul(targets_one_hot)?;
    let per_sample = weighted.sum_axis(weighted.ndim() - 1)?;
    per_sample.neg()?.mean()
}

/// Fraction of samples whose argmax prediction matches the one-hot target.
pub fn accuracy(logits: &Tensor, targets_one_hot: &Tensor) -> Result<Tensor> {
    if logits.shape() != targets_one_hot.shape() {
        return Err(VeilError::ShapeMismatch {
            expected: logits.shape().dims().to_vec(),
            got: targets_one_hot.shape().dims().to_vec(),
        });
    }
    let pred = logits.argmax(-1)?;
    let truth = targets_one_hot.argmax(-1)?;
    pred.eq_tensor(&truth)?.mean()
}
