use crate::dataset::{TrajectoryBatch, TrajectoryDataset};
use crate::loss::{LossFunction, MSELoss};
use crate::metrics::{average_displacement_error, final_displacement_error, RunningStats};
use crate::models::vanilla::{CellGradients, VanillaNet, VanillaNetGradients};
use crate::optimizers::{Optimizer, SGD};
use ndarray::Array2;
use std::time::Instant;
use tracing::{info, warn};

/// Configuration for training hyperparameters
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub clip_gradient: Option<f64>,
    /// Epochs between test-set evaluations; 0 disables them.
    pub eval_every: usize,
    /// Reshuffle window-to-batch assignment every epoch.
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 20,
            batch_size: 10,
            clip_gradient: Some(10.0),
            eval_every: 1,
            shuffle: true,
        }
    }
}

/// Per-epoch metrics tracked during training
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_loss_std: f64,
    pub train_avg_disp: f64,
    pub train_final_disp: f64,
    pub test_loss: Option<f64>,
    pub test_avg_disp: Option<f64>,
    pub test_final_disp: Option<f64>,
    pub learning_rate: f64,
    pub time_elapsed: f64,
}

/// Loss and displacement errors over one batch or one whole dataset.
#[derive(Debug, Clone, Copy)]
pub struct EvalMetrics {
    pub loss: f64,
    pub avg_disp: f64,
    pub final_disp: f64,
}

/// Trainer for trajectory rollout models with configurable loss and optimizer
pub struct TrajectoryTrainer<L: LossFunction, O: Optimizer> {
    pub network: VanillaNet,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
}

impl<L: LossFunction, O: Optimizer> TrajectoryTrainer<L, O> {
    pub fn new(network: VanillaNet, loss_function: L, optimizer: O) -> Self {
        TrajectoryTrainer {
            network,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one optimizer step on a batch: roll the model out over the
    /// prediction horizon, backpropagate the mean squared error through the
    /// whole rollout, clip, and update.
    pub fn train_batch(&mut self, batch: &TrajectoryBatch) -> EvalMetrics {
        let horizon = batch.future.len();
        assert!(horizon > 0, "batch has no future steps");

        let (predictions, cache) = self.network.forward_with_cache(&batch.observed, horizon);

        let mut total_loss = 0.0;
        let mut step_gradients = Vec::with_capacity(horizon);
        for (prediction, target) in predictions.iter().zip(&batch.future) {
            total_loss += self.loss_function.compute_loss(prediction, target);
            // The rollout loss averages over steps, so each per-step
            // gradient carries a 1/horizon factor.
            let grad = self.loss_function.compute_gradient(prediction, target) / horizon as f64;
            step_gradients.push(grad);
        }

        let mut gradients = self.network.backward(&step_gradients, &cache);
        if let Some(clip_value) = self.config.clip_gradient {
            self.clip_gradients(&mut gradients, clip_value);
        }
        self.network.update_parameters(&gradients, &mut self.optimizer);

        EvalMetrics {
            loss: total_loss / horizon as f64,
            avg_disp: average_displacement_error(&predictions, &batch.future),
            final_disp: final_displacement_error(&predictions, &batch.future),
        }
    }

    /// Train for one epoch and record its metrics.
    pub fn run_epoch(
        &mut self,
        epoch: usize,
        train_data: &TrajectoryDataset,
        test_data: Option<&TrajectoryDataset>,
    ) -> TrainingMetrics {
        let start_time = Instant::now();

        self.optimizer.begin_epoch(epoch);
        self.network.train();

        let batches = if self.config.shuffle {
            train_data.shuffled_batches(self.config.batch_size, &mut rand::thread_rng())
        } else {
            train_data.batches(self.config.batch_size)
        };

        let mut losses = RunningStats::new();
        let mut avg_disp = RunningStats::new();
        let mut final_disp = RunningStats::new();
        for batch in &batches {
            let stats = self.train_batch(batch);
            losses.push(stats.loss);
            avg_disp.push(stats.avg_disp);
            final_disp.push(stats.final_disp);
        }

        let evaluated = match test_data {
            Some(data)
                if self.config.eval_every > 0 && (epoch + 1) % self.config.eval_every == 0 =>
            {
                Some(self.evaluate(data))
            }
            _ => None,
        };

        let metrics = TrainingMetrics {
            epoch,
            train_loss: losses.mean(),
            train_loss_std: losses.std_dev(),
            train_avg_disp: avg_disp.mean(),
            train_final_disp: final_disp.mean(),
            test_loss: evaluated.map(|m| m.loss),
            test_avg_disp: evaluated.map(|m| m.avg_disp),
            test_final_disp: evaluated.map(|m| m.final_disp),
            learning_rate: self.optimizer.learning_rate(),
            time_elapsed: start_time.elapsed().as_secs_f64(),
        };

        if !metrics.train_loss.is_finite() {
            warn!("epoch {}: training loss is not finite", epoch);
        }

        info!(
            "epoch {}: train loss {:.6} (std {:.6}), avgD {:.4}, finalD {:.4}, lr {:.6}, {:.2}s",
            epoch,
            metrics.train_loss,
            metrics.train_loss_std,
            metrics.train_avg_disp,
            metrics.train_final_disp,
            metrics.learning_rate,
            metrics.time_elapsed
        );
        if let Some(eval) = &evaluated {
            info!(
                "epoch {}: test loss {:.6}, avgD {:.4}, finalD {:.4}",
                epoch, eval.loss, eval.avg_disp, eval.final_disp
            );
        }

        self.metrics_history.push(metrics.clone());
        metrics
    }

    /// Train for the configured number of epochs.
    pub fn train(&mut self, train_data: &TrajectoryDataset, test_data: Option<&TrajectoryDataset>) {
        info!(
            "training {} model for {} epochs on {} windows",
            self.network.kind().as_str(),
            self.config.epochs,
            train_data.len()
        );

        for epoch in 0..self.config.epochs {
            self.run_epoch(epoch, train_data, test_data);
        }

        info!("training finished");
    }

    /// Evaluate on a dataset without updating parameters. Leaves the
    /// network in eval mode.
    pub fn evaluate(&mut self, dataset: &TrajectoryDataset) -> EvalMetrics {
        self.network.eval();

        let mut losses = RunningStats::new();
        let mut avg_disp = RunningStats::new();
        let mut final_disp = RunningStats::new();

        for batch in dataset.batches(self.config.batch_size) {
            let horizon = batch.future.len();
            let predictions = self.network.forward(&batch.observed, horizon);

            let total: f64 = predictions
                .iter()
                .zip(&batch.future)
                .map(|(prediction, target)| self.loss_function.compute_loss(prediction, target))
                .sum();
            losses.push(total / horizon as f64);
            avg_disp.push(average_displacement_error(&predictions, &batch.future));
            final_disp.push(final_displacement_error(&predictions, &batch.future));
        }

        EvalMetrics {
            loss: losses.mean(),
            avg_disp: avg_disp.mean(),
            final_disp: final_disp.mean(),
        }
    }

    /// Clip each gradient matrix to the given L2 norm.
    fn clip_gradients(&self, gradients: &mut VanillaNetGradients, max_norm: f64) {
        clip_gradient_matrix(&mut gradients.embedding.weight, max_norm);
        clip_gradient_matrix(&mut gradients.embedding.bias, max_norm);

        match &mut gradients.cell {
            CellGradients::Lstm(g) => {
                for matrix in [&mut g.w_ih, &mut g.w_hh, &mut g.b_ih, &mut g.b_hh] {
                    clip_gradient_matrix(matrix, max_norm);
                }
            }
            CellGradients::Gru(g) => {
                for matrix in [
                    &mut g.w_ir,
                    &mut g.w_hr,
                    &mut g.b_ir,
                    &mut g.b_hr,
                    &mut g.w_iz,
                    &mut g.w_hz,
                    &mut g.b_iz,
                    &mut g.b_hz,
                    &mut g.w_ih,
                    &mut g.w_hh,
                    &mut g.b_ih,
                    &mut g.b_hh,
                ] {
                    clip_gradient_matrix(matrix, max_norm);
                }
            }
        }

        clip_gradient_matrix(&mut gradients.output.weight, max_norm);
        clip_gradient_matrix(&mut gradients.output.bias, max_norm);
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = (&*matrix * &*matrix).sum().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        *matrix = matrix.map(|x| x * scale);
    }
}

/// Create a basic trainer with SGD optimizer and MSE loss
pub fn create_basic_trainer(
    network: VanillaNet,
    learning_rate: f64,
) -> TrajectoryTrainer<MSELoss, SGD> {
    let loss_function = MSELoss;
    let optimizer = SGD::new(learning_rate);
    TrajectoryTrainer::new(network, loss_function, optimizer)
}
