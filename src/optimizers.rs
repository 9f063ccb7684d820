use crate::schedulers::LearningRateScheduler;
use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);

    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Hook called once at the start of each epoch. Schedule-aware
    /// optimizers adjust their learning rate here.
    fn begin_epoch(&mut self, epoch: usize) {
        let _ = epoch;
    }
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        *param = &*param - self.learning_rate * gradient;
    }

    fn reset(&mut self) {
        // SGD has no state to reset
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates. The bias-correction
/// step count is tracked per parameter.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: HashMap<String, i32>,         // per-parameter step counts
    m: HashMap<String, Array2<f64>>, // first moment estimates
    v: HashMap<String, Array2<f64>>, // second moment estimates
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: HashMap::new(),
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let t = self.t.entry(param_id.to_string()).or_insert(0);
        *t += 1;
        let t = *t;

        // Initialize moment estimates if not present
        if !self.m.contains_key(param_id) {
            self.m
                .insert(param_id.to_string(), Array2::zeros(param.raw_dim()));
            self.v
                .insert(param_id.to_string(), Array2::zeros(param.raw_dim()));
        }

        let m_t = self.m.get_mut(param_id).unwrap();
        let v_t = self.v.get_mut(param_id).unwrap();

        // Update biased moment estimates
        *m_t = self.beta1 * &*m_t + (1.0 - self.beta1) * gradient;
        *v_t = self.beta2 * &*v_t + (1.0 - self.beta2) * gradient * gradient;

        // Bias correction
        let m_hat = &*m_t / (1.0 - self.beta1.powi(t));
        let v_hat = &*v_t / (1.0 - self.beta2.powi(t));

        // Parameter update
        let update = self.learning_rate * m_hat / (v_hat.map(|x| x.sqrt()) + self.epsilon);
        *param = &*param - update;
    }

    fn reset(&mut self) {
        self.t.clear();
        self.m.clear();
        self.v.clear();
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }
}

/// RMSprop: v_t = αv_{t-1} + (1-α)g_t²
///          θ_t = θ_{t-1} - η * g_t / √(v_t + ε)
pub struct RMSprop {
    learning_rate: f64,
    alpha: f64, // decay rate for moving average
    epsilon: f64,
    v: HashMap<String, Array2<f64>>, // running average of squared gradients
}

impl RMSprop {
    pub fn new(learning_rate: f64) -> Self {
        RMSprop::with_params(learning_rate, 0.99, 1e-8)
    }

    pub fn with_params(learning_rate: f64, alpha: f64, epsilon: f64) -> Self {
        RMSprop {
            learning_rate,
            alpha,
            epsilon,
            v: HashMap::new(),
        }
    }
}

impl Optimizer for RMSprop {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        if !self.v.contains_key(param_id) {
            self.v
                .insert(param_id.to_string(), Array2::zeros(param.raw_dim()));
        }

        let v_t = self.v.get_mut(param_id).unwrap();

        // Update running average of squared gradients
        *v_t = self.alpha * &*v_t + (1.0 - self.alpha) * gradient * gradient;

        // Parameter update
        let update = self.learning_rate * gradient / (v_t.map(|x| x.sqrt()) + self.epsilon);
        *param = &*param - update;
    }

    fn reset(&mut self) {
        self.v.clear();
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }
}

impl Optimizer for Box<dyn Optimizer> {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        (**self).update(param_id, param, gradient)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn learning_rate(&self) -> f64 {
        (**self).learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        (**self).set_learning_rate(learning_rate)
    }

    fn begin_epoch(&mut self, epoch: usize) {
        (**self).begin_epoch(epoch)
    }
}

/// Couples an optimizer with a learning-rate schedule. The schedule is
/// evaluated against the base learning rate at each epoch boundary.
pub struct ScheduledOptimizer<O: Optimizer, S: LearningRateScheduler> {
    optimizer: O,
    scheduler: S,
    base_lr: f64,
}

impl<O: Optimizer, S: LearningRateScheduler> ScheduledOptimizer<O, S> {
    pub fn new(mut optimizer: O, mut scheduler: S, base_lr: f64) -> Self {
        let lr = scheduler.get_lr(0, base_lr);
        optimizer.set_learning_rate(lr);
        ScheduledOptimizer {
            optimizer,
            scheduler,
            base_lr,
        }
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }
}

impl<O: Optimizer, S: LearningRateScheduler> Optimizer for ScheduledOptimizer<O, S> {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        self.optimizer.update(param_id, param, gradient)
    }

    fn reset(&mut self) {
        self.optimizer.reset();
        self.scheduler.reset();
    }

    fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.base_lr = learning_rate;
        let lr = self.scheduler.get_lr(0, self.base_lr);
        self.optimizer.set_learning_rate(lr);
    }

    fn begin_epoch(&mut self, epoch: usize) {
        let lr = self.scheduler.get_lr(epoch, self.base_lr);
        self.optimizer.set_learning_rate(lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulers::StepLR;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - 0.1 * &gradient;
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-10);
    }

    #[test]
    fn test_adam_optimizer() {
        let mut optimizer = Adam::new(0.001);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        assert!((param - original_param).map(|x| x.abs()).sum() > 1e-10);
    }

    #[test]
    fn test_adam_first_step_size() {
        // With bias correction, the very first Adam step moves each
        // parameter by roughly the learning rate.
        let mut optimizer = Adam::new(0.001);
        let mut param = arr2(&[[1.0]]);
        let gradient = arr2(&[[0.5]]);

        optimizer.update("p", &mut param, &gradient);
        assert!((param[[0, 0]] - (1.0 - 0.001)).abs() < 1e-5);
    }

    #[test]
    fn test_adam_step_counts_are_per_parameter() {
        // Updating a second parameter must not advance the first one's
        // bias-correction step.
        let mut shared = Adam::new(0.01);
        let mut solo = Adam::new(0.01);
        let gradient = arr2(&[[0.3, -0.2]]);

        let mut a_shared = arr2(&[[1.0, 1.0]]);
        let mut b_shared = arr2(&[[2.0, 2.0]]);
        shared.update("a", &mut a_shared, &gradient);
        shared.update("b", &mut b_shared, &gradient);
        shared.update("a", &mut a_shared, &gradient);

        let mut a_solo = arr2(&[[1.0, 1.0]]);
        solo.update("a", &mut a_solo, &gradient);
        solo.update("a", &mut a_solo, &gradient);

        for (x, y) in a_shared.iter().zip(a_solo.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rmsprop_optimizer() {
        let mut optimizer = RMSprop::new(0.01);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        assert!((param - original_param).map(|x| x.abs()).sum() > 1e-10);
    }

    #[test]
    fn test_scheduled_optimizer_applies_decay() {
        let mut optimizer = ScheduledOptimizer::new(SGD::new(0.003), StepLR::new(8, 0.95), 0.003);

        optimizer.begin_epoch(0);
        assert!((optimizer.learning_rate() - 0.003).abs() < 1e-12);

        optimizer.begin_epoch(8);
        assert!((optimizer.learning_rate() - 0.003 * 0.95).abs() < 1e-12);

        optimizer.begin_epoch(24);
        assert!((optimizer.learning_rate() - 0.003 * 0.95f64.powi(3)).abs() < 1e-12);
    }

    #[test]
    fn test_boxed_optimizer_dispatch() {
        let mut optimizer: Box<dyn Optimizer> = Box::new(SGD::new(0.1));
        let mut param = arr2(&[[1.0]]);
        let gradient = arr2(&[[1.0]]);

        optimizer.update("p", &mut param, &gradient);
        assert!((param[[0, 0]] - 0.9).abs() < 1e-12);
        assert!((optimizer.learning_rate() - 0.1).abs() < 1e-12);
    }
}
