//! Learning rate schedulers.

use std::f32::consts::PI;

/// Trait for learning rate schedulers.
pub trait LrScheduler {
    /// Get the learning rate for the current step.
    fn get_lr(&self, step: usize) -> f32;

    /// Total number of steps (if finite).
    fn total_steps(&self) -> usize;
}

/// Cosine annealing: lr decays from `lr_max` to `lr_min` over `total_steps`.
///
/// lr(t) = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(pi * t / T))
pub struct CosineAnnealing {
    lr_max: f32,
    lr_min: f32,
    total: usize,
}

impl CosineAnnealing {
    pub fn new(lr_max: f32, lr_min: f32, total_steps: usize) -> Self {
        Self { lr_max, lr_min, total: total_steps }
    }
}

impl LrScheduler for CosineAnnealing {
    fn get_lr(&self, step: usize) -> f32 {
        if step >= self.total {
            return self.lr_min;
        }
        let progress = step as f32 / self.total as f32;
        self.lr_min + 0.5 * (self.lr_max - self.lr_min) * (1.0 + (PI * progress).cos())
    }

    fn total_steps(&self) -> usize {
        self.total
    }
}

/// Warmup + cosine annealing.
///
/// Linear warmup from `lr_start` to `lr_max` over `warmup_steps`, then cosine
/// decay from `lr_max` to `lr_min` over the remaining steps. The usual choice
/// for MAE pretraining runs.
pub struct WarmupCosine {
    lr_start: f32,
    lr_max: f32,
    lr_min: f32,
    warmup_steps: usize,
    total: usize,
}

impl WarmupCosine {
    pub fn new(
        lr_start: f32,
        lr_max: f32,
        lr_min: f32,
        warmup_steps: usize,
        total_steps: usize,
    ) -> Self {
        assert!(warmup_steps < total_steps, "warmup_steps must be < total_steps");
        Self { lr_start, lr_max, lr_min, warmup_steps, total: total_steps }
    }
}

impl LrScheduler for WarmupCosine {
    fn get_lr(&self, step: usize) -> f32 {
        if step < self.warmup_steps {
            let progress = step as f32 / self.warmup_steps as f32;
            self.lr_start + (self.lr_max - self.lr_start) * progress
        } else if step >= self.total {
            self.lr_min
        } else {
            let decay_steps = self.total - self.warmup_steps;
            let decay_step = step - self.warmup_steps;
            let progress = decay_step as f32 / decay_steps as f32;
            self.lr_min + 0.5 * (self.lr_max - self.lr_min) * (1.0 + (PI * progress).cos())
        }
    }

    fn total_steps(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_annealing() {
        let sched = CosineAnnealing::new(0.01, 0.0, 100);
        assert!((sched.get_lr(0) - 0.01).abs() < 1e-6);
        let mid = sched.get_lr(50);
        assert!((mid - 0.005).abs() < 1e-4, "mid={}", mid);
        assert!((sched.get_lr(100) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_monotonic_decrease() {
        let sched = CosineAnnealing::new(0.1, 0.0, 1000);
        let mut prev = sched.get_lr(0);
        for step in 1..=1000 {
            let lr = sched.get_lr(step);
            assert!(lr <= prev + 1e-7, "step {}: {} > {}", step, lr, prev);
            prev = lr;
        }
    }

    #[test]
    fn test_warmup_cosine() {
        let sched = WarmupCosine::new(0.0, 0.01, 0.0, 100, 1000);
        assert!((sched.get_lr(0) - 0.0).abs() < 1e-6);
        let warmup_end = sched.get_lr(100);
        assert!((warmup_end - 0.01).abs() < 1e-4, "warmup_end={}", warmup_end);
        assert!(sched.get_lr(500) < 0.01);
        assert!((sched.get_lr(1000) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_warmup_increasing() {
        let sched = WarmupCosine::new(0.0, 0.01, 0.0, 100, 1000);
        let mut prev = sched.get_lr(0);
        for step in 1..100 {
            let lr = sched.get_lr(step);
            assert!(lr >= prev - 1e-7, "warmup step {}: {} < {}", step, lr, prev);
            prev = lr;
        }
    }
}
