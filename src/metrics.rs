//! Displacement-error metrics for predicted trajectories.
//!
//! Both metrics work on time-major slices of (2, peds) coordinate matrices,
//! the shape the rollout produces. Errors are Euclidean distances between
//! predicted and ground-truth positions.

use crate::utils::{mean, std_dev};
use ndarray::Array2;

/// Sum of per-pedestrian Euclidean errors for one step.
fn step_displacement_sum(predicted: &Array2<f64>, target: &Array2<f64>) -> f64 {
    assert_eq!(predicted.dim().0, 2, "displacement metrics expect 2D coordinates");
    let diff = predicted - target;
    let mut sum = 0.0;
    for ped in 0..diff.dim().1 {
        let dx = diff[[0, ped]];
        let dy = diff[[1, ped]];
        sum += (dx * dx + dy * dy).sqrt();
    }
    sum
}

/// Average displacement error: Euclidean error summed over every predicted
/// step and pedestrian, divided by `steps * peds`.
pub fn average_displacement_error(predictions: &[Array2<f64>], targets: &[Array2<f64>]) -> f64 {
    assert_eq!(
        predictions.len(),
        targets.len(),
        "prediction and target horizons differ"
    );
    assert!(!predictions.is_empty(), "empty prediction horizon");

    let peds = predictions[0].dim().1;
    let total: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| step_displacement_sum(p, t))
        .sum();
    total / (predictions.len() * peds) as f64
}

/// Final displacement error: Euclidean error at the last predicted step,
/// divided by the number of pedestrians.
pub fn final_displacement_error(predictions: &[Array2<f64>], targets: &[Array2<f64>]) -> f64 {
    assert_eq!(
        predictions.len(),
        targets.len(),
        "prediction and target horizons differ"
    );
    assert!(!predictions.is_empty(), "empty prediction horizon");

    let last = predictions.len() - 1;
    let peds = predictions[last].dim().1;
    step_displacement_sum(&predictions[last], &targets[last]) / peds as f64
}

/// Accumulates per-batch scalars within an epoch and reports their mean and
/// population standard deviation.
#[derive(Clone, Debug, Default)]
pub struct RunningStats {
    values: Vec<f64>,
}

impl RunningStats {
    pub fn new() -> Self {
        RunningStats { values: Vec::new() }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values)
    }

    pub fn std_dev(&self) -> f64 {
        std_dev(&self.values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
