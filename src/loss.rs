use ndarray::Array2;

/// Loss function trait for training
pub trait LossFunction {
    /// Compute the loss between predictions and targets
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64;

    /// Compute the gradient of the loss with respect to predictions
    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64>;
}

/// Mean Squared Error over all elements.
///
/// Applied per predicted step; averaging the per-step values over the
/// horizon equals the mean over the whole stacked rollout, which is the
/// training objective.
pub struct MSELoss;

impl LossFunction for MSELoss {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let diff = predictions - targets;
        let squared_diff = &diff * &diff;
        squared_diff.sum() / (predictions.len() as f64)
    }

    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let diff = predictions - targets;
        2.0 * diff / (predictions.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_mse_loss() {
        let loss_fn = MSELoss;
        let predictions = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let targets = arr2(&[[1.5, 2.5], [2.5, 3.5]]);

        let loss = loss_fn.compute_loss(&predictions, &targets);
        assert!((loss - 0.25).abs() < 1e-6);

        let gradient = loss_fn.compute_gradient(&predictions, &targets);
        assert_eq!(gradient.shape(), predictions.shape());
        // d/dp of mean squared error: 2 * (p - t) / n
        assert!((gradient[[0, 0]] - (2.0 * -0.5 / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_mse_zero_at_target() {
        let loss_fn = MSELoss;
        let predictions = arr2(&[[0.25, -1.0]]);

        assert_eq!(loss_fn.compute_loss(&predictions, &predictions), 0.0);
        let gradient = loss_fn.compute_gradient(&predictions, &predictions);
        assert!(gradient.iter().all(|&g| g == 0.0));
    }
}
