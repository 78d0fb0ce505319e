use std::collections::BTreeMap;

use veil_core::{Result, Tensor};
use veil_nn::Params;

/// Per-group hyperparameters for Adam.
///
/// Groups select parameters by dotted-path prefix, so an encoder transferred
/// from pretraining can run at a lower learning rate (or stay frozen) while
/// the fresh head trains at full rate.
#[derive(Clone, Debug)]
pub struct ParamGroup {
    /// Learning rate override for this group (None = use optimizer default).
    pub lr: Option<f32>,
    /// Weight decay override (None = use optimizer default).
    pub weight_decay: Option<f32>,
    /// If true, parameters in this group are frozen (no updates).
    pub frozen: bool,
    /// Dotted-path prefix, e.g. `encoder` or `encoder.blocks.0`.
    pub prefix: String,
}

impl ParamGroup {
    /// Create a group with default overrides (inherits optimizer settings).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { lr: None, weight_decay: None, frozen: false, prefix: prefix.into() }
    }

    /// Builder: set learning rate.
    pub fn with_lr(mut self, lr: f32) -> Self {
        self.lr = Some(lr);
        self
    }

    /// Builder: set weight decay.
    pub fn with_weight_decay(mut self, wd: f32) -> Self {
        self.weight_decay = Some(wd);
        self
    }

    /// Builder: freeze this group.
    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    fn matches(&self, path: &str) -> bool {
        self.prefix.is_empty()
            || path == self.prefix
            || path.starts_with(&format!("{}.", self.prefix))
    }
}

/// Adam optimizer with decoupled weight decay (AdamW).
///
/// Moment estimates are kept per parameter path and created lazily on first
/// sight, so the same optimizer instance keeps working when a blob gains
/// tensors (e.g. a classifier head added after pretraining).
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    m: BTreeMap<String, Tensor>,
    v: BTreeMap<String, Tensor>,
    t: usize,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32, weight_decay: f32) -> Self {
        Self { lr, beta1, beta2, eps, weight_decay, m: BTreeMap::new(), v: BTreeMap::new(), t: 0 }
    }

    /// Create with default hyperparameters (lr, betas=(0.9, 0.999), eps=1e-8).
    pub fn default_with_lr(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.0)
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Set the global learning rate (driven by a scheduler between steps).
    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    /// Current step count.
    pub fn step_count(&self) -> usize {
        self.t
    }

    /// Perform one optimization step over every gradient in `grads`.
    ///
    /// Gradients are keyed by the same dotted paths as the parameters; a
    /// gradient without a matching parameter is an error.
    pub fn step(&mut self, params: &mut Params, grads: &Params) -> Result<()> {
        self.step_groups(params, grads, &[ParamGroup::new("")])
    }

    /// Perform one step with parameter groups.
    ///
    /// Each gradient is handled by the first group whose prefix matches its
    /// path; gradients matching no group are skipped.
    pub fn step_groups(
        &mut self,
        params: &mut Params,
        grads: &Params,
        groups: &[ParamGroup],
    ) -> Result<()> {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t as i32);
        let bc2 = 1.0 - self.beta2.powi(self.t as i32);

        let mut updates: Vec<(String, Tensor)> = Vec::new();
        for (path, grad) in grads.iter() {
            let Some(group) = groups.iter().find(|g| g.matches(path)) else {
                continue;
            };
            if group.frozen {
                continue;
            }
            let lr = group.lr.unwrap_or(self.lr);
            let wd = group.weight_decay.unwrap_or(self.weight_decay);

            let mut param = params.get(path)?.clone();

            // decoupled weight decay
            if wd > 0.0 {
                param = param.sub(&param.mul_scalar(wd * lr)?)?;
            }

            // m = beta1 * m + (1 - beta1) * grad
            let m_prev = self
                .m
                .remove(path)
                .unwrap_or_else(|| Tensor::zeros(grad.shape().dims(), grad.dtype()));
            let m_new = m_prev.mul_scalar(self.beta1)?.add(&grad.mul_scalar(1.0 - self.beta1)?)?;

            // v = beta2 * v + (1 - beta2) * grad^2
            let v_prev = self
                .v
                .remove(path)
                .unwrap_or_else(|| Tensor::zeros(grad.shape().dims(), grad.dtype()));
            let grad_sq = grad.mul(grad)?;
            let v_new = v_prev.mul_scalar(self.beta2)?.add(&grad_sq.mul_scalar(1.0 - self.beta2)?)?;

            // bias-corrected estimates
            let m_hat = m_new.mul_scalar(1.0 / bc1)?;
            let v_hat = v_new.mul_scalar(1.0 / bc2)?;

            // param -= lr * m_hat / (sqrt(v_hat) + eps)
            let denom = v_hat.sqrt()?.add_scalar(self.eps)?;
            let update = m_hat.div(&denom)?.mul_scalar(lr)?;
            let param = param.sub(&update)?;

            self.m.insert(path.clone(), m_new);
            self.v.insert(path.clone(), v_new);
            updates.push((path.clone(), param));
        }

        for (path, tensor) in updates {
            params.insert(path, tensor);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(pairs: &[(&str, &[f32])]) -> Params {
        let mut p = Params::new();
        for (name, data) in pairs {
            p.insert(*name, Tensor::from_f32(data, &[data.len()]));
        }
        p
    }

    #[test]
    fn test_adam_step() {
        let mut params = blob(&[("fc.weight", &[1.0, 2.0, 3.0])]);
        let grads = blob(&[("fc.weight", &[0.1, 0.2, 0.3])]);

        let mut opt = Adam::default_with_lr(0.001);
        opt.step(&mut params, &grads).unwrap();

        let data = params.get("fc.weight").unwrap().as_f32_slice().unwrap().to_vec();
        assert!(data[0] < 1.0);
        assert!(data[1] < 2.0);
        assert!(data[2] < 3.0);
    }

    #[test]
    fn test_adam_multiple_steps() {
        let mut params = blob(&[("w", &[5.0])]);
        let grads = blob(&[("w", &[1.0])]);

        let mut opt = Adam::default_with_lr(0.1);
        for _ in 0..10 {
            opt.step(&mut params, &grads).unwrap();
        }
        assert!(params.get("w").unwrap().get_f32(0).unwrap() < 5.0);
    }

    #[test]
    fn test_missing_param_is_error() {
        let mut params = blob(&[("a", &[1.0])]);
        let grads = blob(&[("b", &[1.0])]);
        let mut opt = Adam::default_with_lr(0.1);
        assert!(opt.step(&mut params, &grads).is_err());
    }

    #[test]
    fn test_param_groups_different_lr() {
        let mut params = blob(&[("encoder.w", &[5.0]), ("head.w", &[5.0])]);
        let grads = blob(&[("encoder.w", &[1.0]), ("head.w", &[1.0])]);

        let groups = vec![
            ParamGroup::new("encoder").with_lr(0.001),
            ParamGroup::new("head").with_lr(0.1),
        ];

        let mut opt = Adam::default_with_lr(0.01);
        for _ in 0..10 {
            opt.step_groups(&mut params, &grads, &groups).unwrap();
        }

        let enc = params.get("encoder.w").unwrap().get_f32(0).unwrap();
        let head = params.get("head.w").unwrap().get_f32(0).unwrap();
        assert!(head < enc, "head ({head}) should have moved further than encoder ({enc})");
    }

    #[test]
    fn test_param_groups_frozen() {
        let mut params = blob(&[("encoder.w", &[5.0]), ("head.w", &[5.0])]);
        let grads = blob(&[("encoder.w", &[1.0]), ("head.w", &[1.0])]);

        let groups =
            vec![ParamGroup::new("encoder").frozen(), ParamGroup::new("head").with_lr(0.1)];

        let mut opt = Adam::default_with_lr(0.01);
        opt.step_groups(&mut params, &grads, &groups).unwrap();

        let enc = params.get("encoder.w").unwrap().get_f32(0).unwrap();
        let head = params.get("head.w").unwrap().get_f32(0).unwrap();
        assert!((enc - 5.0).abs() < 1e-7, "frozen encoder moved to {enc}");
        assert!(head < 5.0);
    }

    #[test]
    fn test_weight_decay_shrinks_with_zero_grad() {
        let mut params = blob(&[("w", &[5.0])]);
        let grads = blob(&[("w", &[0.0])]);

        let groups = vec![ParamGroup::new("w").with_lr(0.1).with_weight_decay(0.1)];
        let mut opt = Adam::default_with_lr(0.01);
        opt.step_groups(&mut params, &grads, &groups).unwrap();

        assert!(params.get("w").unwrap().get_f32(0).unwrap() < 5.0);
    }

    #[test]
    fn test_prefix_matching_is_path_aware() {
        // "encoder" must not capture "encoder_extra.w"
        let group = ParamGroup::new("encoder");
        assert!(group.matches("encoder.blocks.0.w"));
        assert!(!group.matches("encoder_extra.w"));
    }
}
