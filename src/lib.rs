//! # traj-lstm
//!
//! Short-horizon pedestrian trajectory forecasting with a hand-rolled
//! recurrent network: observe a few steps of 2D coordinates, then predict
//! the next positions autoregressively.
//!
//! ## Core Components
//!
//! - **Dataset**: delimited trajectory files grouped into fixed-length
//!   windows of co-present pedestrians, batched along the pedestrian axis
//! - **Model**: linear embedding, a vanilla LSTM or GRU cell, and a linear
//!   projection rolled out over the prediction horizon, with full
//!   backpropagation through time
//! - **Training**: MSE objective, displacement-error metrics, gradient
//!   clipping, and per-epoch evaluation
//! - **Optimizers**: SGD, Adam, and RMSprop, with optional step-decay
//!   learning-rate scheduling
//! - **Persistence & Reports**: serde checkpoints plus JPEG charts and a
//!   statistics table per run
//!
//! ## Quick Start
//!
//! ```rust
//! use traj_lstm::models::vanilla::{CellKind, VanillaNet};
//! use traj_lstm::training::create_basic_trainer;
//!
//! // Embed 2D coordinates into 64 features, run an LSTM cell, project back.
//! let network = VanillaNet::new(CellKind::Lstm, 2, 64, 64, 2);
//! let mut trainer = create_basic_trainer(network, 0.003);
//!
//! // Train on your data
//! // trainer.train(&train_dataset, Some(&test_dataset));
//! ```

/// Main library module.
pub mod dataset;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod report;
pub mod schedulers;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use dataset::{DatasetConfig, DatasetError, TrajectoryBatch, TrajectoryDataset};
pub use layers::gru_cell::GRUCell;
pub use layers::lstm_cell::LSTMCell;
pub use loss::{LossFunction, MSELoss};
pub use metrics::{average_displacement_error, final_displacement_error};
pub use models::vanilla::{CellKind, VanillaNet};
pub use optimizers::{Adam, Optimizer, RMSprop, ScheduledOptimizer, SGD};
pub use persistence::{CheckpointMetadata, ModelPersistence, PersistenceError, PersistentModel};
pub use report::{run_tag, ReportConfig, ReportError};
pub use schedulers::{ConstantLR, LearningRateScheduler, StepLR};
pub use training::{TrainingConfig, TrainingMetrics, TrajectoryTrainer};

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_library_integration() {
        let mut network = VanillaNet::new(CellKind::Lstm, 2, 4, 4, 2);
        let observed = vec![arr2(&[[0.0], [0.0]]), arr2(&[[1.0], [0.5]])];

        let predictions = network.forward(&observed, 3);

        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].shape(), &[2, 1]);
    }
}
