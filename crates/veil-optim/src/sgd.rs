use std::collections::BTreeMap;

use veil_core::{Result, Tensor};
use veil_nn::Params;

/// Stochastic gradient descent with momentum and (coupled) weight decay.
pub struct SGD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocities: BTreeMap<String, Tensor>,
}

impl SGD {
    pub fn new(lr: f32, momentum: f32, weight_decay: f32) -> Self {
        Self { lr, momentum, weight_decay, velocities: BTreeMap::new() }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Perform one optimization step over every gradient in `grads`.
    pub fn step(&mut self, params: &mut Params, grads: &Params) -> Result<()> {
        let mut updates: Vec<(String, Tensor)> = Vec::new();
        for (path, grad) in grads.iter() {
            let param = params.get(path)?;
            let mut g = grad.clone();

            // g = g + wd * param
            if self.weight_decay > 0.0 {
                g = g.add(&param.mul_scalar(self.weight_decay)?)?;
            }

            // v = momentum * v + g
            if self.momentum > 0.0 {
                let v_prev = self
                    .velocities
                    .remove(path)
                    .unwrap_or_else(|| Tensor::zeros(grad.shape().dims(), grad.dtype()));
                let v = v_prev.mul_scalar(self.momentum)?.add(&g)?;
                self.velocities.insert(path.clone(), v.clone());
                g = v;
            }

            // param = param - lr * g
            let new_param = param.sub(&g.mul_scalar(self.lr)?)?;
            updates.push((path.clone(), new_param));
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

    #[test]
    fn test_sgd_step() {
        let mut params = Params::new();
        params.insert("fc.weight", Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]));
        let mut grads = Params::new();
        grads.insert("fc.weight", Tensor::from_f32(&[0.1, 0.2, 0.3], &[3]));

        let mut opt = SGD::new(0.1, 0.0, 0.0);
        opt.step(&mut params, &grads).unwrap();

        let data = params.get("fc.weight").unwrap().as_f32_slice().unwrap().to_vec();
        assert!((data[0] - 0.99).abs() < 1e-6);
        assert!((data[1] - 1.98).abs() < 1e-6);
        assert!((data[2] - 2.97).abs() < 1e-6);
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut params = Params::new();
        params.insert("w", Tensor::from_f32(&[0.0], &[1]));
        let mut grads = Params::new();
        grads.insert("w", Tensor::from_f32(&[1.0], &[1]));

        let mut plain = SGD::new(0.1, 0.0, 0.0);
        let mut with_momentum = SGD::new(0.1, 0.9, 0.0);

        let mut params_m = params.clone();
        for _ in 0..3 {
            plain.step(&mut params, &grads).unwrap();
            with_momentum.step(&mut params_m, &grads).unwrap();
        }

        let a = params.get("w").unwrap().get_f32(0).unwrap();
        let b = params_m.get("w").unwrap().get_f32(0).unwrap();
        assert!(b < a, "momentum ({b}) should outrun plain SGD ({a})");
    }

    #[test]
    fn test_missing_param_is_error() {
        let mut params = Params::new();
        let mut grads = Params::new();
        grads.insert("ghost", Tensor::from_f32(&[1.0], &[1]));
        assert!(SGD::new(0.1, 0.0, 0.0).step(&mut params, &grads).is_err());
    }
}
