/// Learning rate scheduler trait for adjusting the learning rate across epochs
pub trait LearningRateScheduler {
    /// Get the learning rate for the current epoch
    fn get_lr(&mut self, epoch: usize, base_lr: f64) -> f64;

    /// Reset the scheduler state (useful for multiple training runs)
    fn reset(&mut self);

    /// Get the name of the scheduler for logging
    fn name(&self) -> &'static str;
}

/// Constant learning rate (no scheduling)
#[derive(Clone, Debug)]
pub struct ConstantLR;

impl LearningRateScheduler for ConstantLR {
    fn get_lr(&mut self, _epoch: usize, base_lr: f64) -> f64 {
        base_lr
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "ConstantLR"
    }
}

/// Step decay scheduler: multiply LR by gamma every step_size epochs
#[derive(Clone, Debug)]
pub struct StepLR {
    step_size: usize,
    gamma: f64,
}

impl StepLR {
    pub fn new(step_size: usize, gamma: f64) -> Self {
        assert!(step_size > 0, "step_size must be at least 1");
        StepLR { step_size, gamma }
    }
}

impl LearningRateScheduler for StepLR {
    fn get_lr(&mut self, epoch: usize, base_lr: f64) -> f64 {
        let steps = epoch / self.step_size;
        base_lr * self.gamma.powi(steps as i32)
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "StepLR"
    }
}

impl LearningRateScheduler for Box<dyn LearningRateScheduler> {
    fn get_lr(&mut self, epoch: usize, base_lr: f64) -> f64 {
        (**self).get_lr(epoch, base_lr)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_lr() {
        let mut scheduler = ConstantLR;
        assert_eq!(scheduler.get_lr(0, 0.01), 0.01);
        assert_eq!(scheduler.get_lr(100, 0.01), 0.01);
    }

    #[test]
    fn test_step_lr_decays_on_boundaries() {
        let mut scheduler = StepLR::new(8, 0.95);

        assert!((scheduler.get_lr(0, 0.003) - 0.003).abs() < 1e-12);
        assert!((scheduler.get_lr(7, 0.003) - 0.003).abs() < 1e-12);
        assert!((scheduler.get_lr(8, 0.003) - 0.003 * 0.95).abs() < 1e-12);
        assert!((scheduler.get_lr(16, 0.003) - 0.003 * 0.95 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_boxed_scheduler_dispatch() {
        let mut scheduler: Box<dyn LearningRateScheduler> = Box::new(StepLR::new(2, 0.5));
        assert_eq!(scheduler.name(), "StepLR");
        assert!((scheduler.get_lr(2, 1.0) - 0.5).abs() < 1e-12);
    }
}
