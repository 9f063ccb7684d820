use std::fmt::Write as _;
use std::path::Path;
use tempfile::tempdir;
use traj_lstm::dataset::{DatasetConfig, TrajectoryDataset};
use traj_lstm::loss::MSELoss;
use traj_lstm::models::vanilla::{CellKind, VanillaNet};
use traj_lstm::optimizers::{Adam, ScheduledOptimizer};
use traj_lstm::schedulers::StepLR;
use traj_lstm::training::{TrainingConfig, TrajectoryTrainer};

/// Straight-line walkers at constant velocity, written as a tab-delimited
/// trajectory file.
fn write_walk_file(path: &Path, frames: usize, walkers: &[(i64, f64, f64)]) {
    let mut contents = String::new();
    for frame in 0..frames {
        for &(ped, vx, vy) in walkers {
            writeln!(
                contents,
                "{:.1}\t{:.1}\t{:.3}\t{:.3}",
                frame as f64,
                ped as f64,
                vx * frame as f64,
                vy * frame as f64
            )
            .unwrap();
        }
    }
    std::fs::write(path, contents).unwrap();
}

fn small_dataset(dir: &Path) -> TrajectoryDataset {
    write_walk_file(
        &dir.join("walks.txt"),
        16,
        &[(1, 0.1, 0.05), (2, -0.08, 0.1), (3, 0.05, -0.1)],
    );
    let config = DatasetConfig {
        obs_len: 4,
        pred_len: 6,
        skip: 1,
        min_peds: 1,
        delim: '\t',
    };
    TrajectoryDataset::from_dir(dir, &config).unwrap()
}

fn config(epochs: usize) -> TrainingConfig {
    TrainingConfig {
        epochs,
        batch_size: 4,
        clip_gradient: Some(10.0),
        eval_every: 1,
        shuffle: true,
    }
}

#[test]
fn test_training_reduces_loss_on_synthetic_walks() {
    let dir = tempdir().unwrap();
    let dataset = small_dataset(dir.path());

    let network = VanillaNet::new(CellKind::Lstm, 2, 8, 8, 2);
    let mut cfg = config(12);
    cfg.shuffle = false;
    let mut trainer =
        TrajectoryTrainer::new(network, MSELoss, Adam::new(0.01)).with_config(cfg);

    trainer.train(&dataset, None);

    let history = trainer.get_metrics_history();
    assert_eq!(history.len(), 12);
    for metrics in history {
        assert!(metrics.train_loss.is_finite());
        assert!(metrics.train_loss >= 0.0);
        assert!(metrics.train_avg_disp >= 0.0);
        assert!(metrics.train_final_disp >= 0.0);
    }
    assert!(
        history[11].train_loss < history[0].train_loss,
        "loss did not decrease: {} -> {}",
        history[0].train_loss,
        history[11].train_loss
    );
}

#[test]
fn test_evaluation_metrics_populated() {
    let dir = tempdir().unwrap();
    let train_data = small_dataset(dir.path());
    let test_dir = tempdir().unwrap();
    let test_data = small_dataset(test_dir.path());

    let network = VanillaNet::new(CellKind::Gru, 2, 8, 8, 2);
    let mut trainer =
        TrajectoryTrainer::new(network, MSELoss, Adam::new(0.005)).with_config(config(2));

    trainer.train(&train_data, Some(&test_data));

    let latest = trainer.get_latest_metrics().unwrap();
    let test_loss = latest.test_loss.unwrap();
    assert!(test_loss.is_finite() && test_loss >= 0.0);
    assert!(latest.test_avg_disp.unwrap() >= 0.0);
    assert!(latest.test_final_disp.unwrap() >= 0.0);
}

#[test]
fn test_evaluation_respects_frequency() {
    let dir = tempdir().unwrap();
    let train_data = small_dataset(dir.path());
    let test_dir = tempdir().unwrap();
    let test_data = small_dataset(test_dir.path());

    let network = VanillaNet::new(CellKind::Lstm, 2, 8, 8, 2);
    let mut cfg = config(4);
    cfg.eval_every = 2;
    let mut trainer =
        TrajectoryTrainer::new(network, MSELoss, Adam::new(0.005)).with_config(cfg);

    trainer.train(&train_data, Some(&test_data));

    let history = trainer.get_metrics_history();
    assert!(history[0].test_loss.is_none());
    assert!(history[1].test_loss.is_some());
    assert!(history[2].test_loss.is_none());
    assert!(history[3].test_loss.is_some());
}

#[test]
fn test_scheduled_learning_rate_decays() {
    let dir = tempdir().unwrap();
    let dataset = small_dataset(dir.path());

    let network = VanillaNet::new(CellKind::Lstm, 2, 8, 8, 2);
    let optimizer = ScheduledOptimizer::new(Adam::new(0.01), StepLR::new(2, 0.5), 0.01);
    let mut cfg = config(4);
    cfg.eval_every = 0;
    let mut trainer = TrajectoryTrainer::new(network, MSELoss, optimizer).with_config(cfg);

    trainer.train(&dataset, None);

    let history = trainer.get_metrics_history();
    assert!((history[0].learning_rate - 0.01).abs() < 1e-12);
    assert!((history[1].learning_rate - 0.01).abs() < 1e-12);
    assert!((history[2].learning_rate - 0.005).abs() < 1e-12);
    assert!((history[3].learning_rate - 0.005).abs() < 1e-12);
}

#[test]
fn test_clipped_training_stays_finite() {
    let dir = tempdir().unwrap();
    let dataset = small_dataset(dir.path());

    let network = VanillaNet::new(CellKind::Gru, 2, 8, 8, 2);
    let mut cfg = config(3);
    cfg.clip_gradient = Some(1.0);
    let mut trainer =
        TrajectoryTrainer::new(network, MSELoss, Adam::new(0.1)).with_config(cfg);

    trainer.train(&dataset, None);

    for metrics in trainer.get_metrics_history() {
        assert!(metrics.train_loss.is_finite());
    }
}
