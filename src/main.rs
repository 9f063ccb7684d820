use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use traj_lstm::dataset::{DatasetConfig, TrajectoryDataset};
use traj_lstm::loss::MSELoss;
use traj_lstm::models::vanilla::{CellKind, VanillaNet};
use traj_lstm::optimizers::{Adam, Optimizer, RMSprop, ScheduledOptimizer, SGD};
use traj_lstm::persistence::{CheckpointMetadata, PersistentModel};
use traj_lstm::report::{run_tag, write_reports, ReportConfig};
use traj_lstm::schedulers::{ConstantLR, LearningRateScheduler, StepLR};
use traj_lstm::training::{TrainingConfig, TrajectoryTrainer};

/// Train a vanilla LSTM/GRU network to predict short-horizon pedestrian
/// trajectories from observed 2D coordinate sequences.
#[derive(Parser, Debug)]
#[command(name = "traj-lstm", version)]
struct Cli {
    /// Directory of training trajectory files (frame, ped, x, y per line)
    #[arg(long, default_value = "data/train")]
    train_dir: PathBuf,

    /// Directory of test trajectory files; omit to skip evaluation
    #[arg(long)]
    test_dir: Option<PathBuf>,

    /// Field delimiter: "tab", "space", or a single character
    #[arg(long, default_value = "tab")]
    delim: String,

    /// Observed steps fed to the model
    #[arg(long, default_value_t = 8)]
    obs_len: usize,

    /// Future steps to predict
    #[arg(long, default_value_t = 12)]
    pred_len: usize,

    /// Stride between window start frames
    #[arg(long, default_value_t = 1)]
    skip: usize,

    /// Minimum pedestrians a window must retain to be kept
    #[arg(long, default_value_t = 1)]
    min_peds: usize,

    /// Size of the coordinate embedding
    #[arg(long, default_value_t = 64)]
    embedding_size: usize,

    /// Hidden size of the recurrent cell
    #[arg(long, default_value_t = 64)]
    rnn_size: usize,

    /// Windows per batch
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Number of training epochs
    #[arg(long, default_value_t = 20)]
    num_epochs: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.003)]
    learning_rate: f64,

    /// Multiplicative learning-rate decay factor
    #[arg(long, default_value_t = 0.95)]
    decay_rate: f64,

    /// Epochs between learning-rate decays; 0 keeps the rate constant
    #[arg(long, default_value_t = 8)]
    freq_optimizer: usize,

    /// Epochs between test-set evaluations; 0 disables them
    #[arg(long, default_value_t = 1)]
    freq_validation: usize,

    /// Max L2 norm per gradient matrix; 0 disables clipping
    #[arg(long, default_value_t = 10.0)]
    grad_clip: f64,

    /// Dropout rate on the recurrent cell input
    #[arg(long, default_value_t = 0.0)]
    dropout: f64,

    /// Use a GRU cell instead of an LSTM cell
    #[arg(long)]
    gru: bool,

    /// Optimizer to train with
    #[arg(long, value_enum, default_value = "adam")]
    optimizer: OptimizerKind,

    /// Save a checkpoint every N epochs; 0 saves only at the end
    #[arg(long, default_value_t = 0)]
    save_every: usize,

    /// Directory for model checkpoints
    #[arg(long, default_value = "saved_models")]
    model_dir: PathBuf,

    /// Directory for JPEG charts
    #[arg(long, default_value = "saved_figs")]
    figures_dir: PathBuf,

    /// Directory for statistics tables
    #[arg(long, default_value = "saved_stats")]
    stats_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OptimizerKind {
    Adam,
    Sgd,
    Rmsprop,
}

type BoxedTrainer =
    TrajectoryTrainer<MSELoss, ScheduledOptimizer<Box<dyn Optimizer>, Box<dyn LearningRateScheduler>>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("traj_lstm=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    ensure!(cli.obs_len > 0, "--obs-len must be at least 1");
    ensure!(cli.pred_len > 0, "--pred-len must be at least 1");
    ensure!(cli.num_epochs > 0, "--num-epochs must be at least 1");

    let dataset_config = DatasetConfig {
        obs_len: cli.obs_len,
        pred_len: cli.pred_len,
        skip: cli.skip,
        min_peds: cli.min_peds,
        delim: parse_delim(&cli.delim)?,
    };

    let train_data = TrajectoryDataset::from_dir(&cli.train_dir, &dataset_config)
        .with_context(|| format!("loading training data from {}", cli.train_dir.display()))?;
    let test_data = match &cli.test_dir {
        Some(dir) => Some(
            TrajectoryDataset::from_dir(dir, &dataset_config)
                .with_context(|| format!("loading test data from {}", dir.display()))?,
        ),
        None => None,
    };

    let kind = if cli.gru { CellKind::Gru } else { CellKind::Lstm };
    let network = VanillaNet::new(kind, 2, cli.embedding_size, cli.rnn_size, 2)
        .with_input_dropout(cli.dropout);
    info!(
        "model: {} cell, embedding {}, hidden {}, {} parameters",
        kind.as_str(),
        cli.embedding_size,
        cli.rnn_size,
        network.num_parameters()
    );

    let base: Box<dyn Optimizer> = match cli.optimizer {
        OptimizerKind::Adam => Box::new(Adam::new(cli.learning_rate)),
        OptimizerKind::Sgd => Box::new(SGD::new(cli.learning_rate)),
        OptimizerKind::Rmsprop => Box::new(RMSprop::new(cli.learning_rate)),
    };
    let scheduler: Box<dyn LearningRateScheduler> = if cli.freq_optimizer > 0 {
        Box::new(StepLR::new(cli.freq_optimizer, cli.decay_rate))
    } else {
        Box::new(ConstantLR)
    };
    let optimizer = ScheduledOptimizer::new(base, scheduler, cli.learning_rate);

    let training_config = TrainingConfig {
        epochs: cli.num_epochs,
        batch_size: cli.batch_size,
        clip_gradient: (cli.grad_clip > 0.0).then_some(cli.grad_clip),
        eval_every: cli.freq_validation,
        shuffle: true,
    };
    let mut trainer =
        TrajectoryTrainer::new(network, MSELoss, optimizer).with_config(training_config);

    let tag = run_tag(cli.learning_rate, cli.num_epochs, cli.pred_len);
    let checkpoint_path = cli
        .model_dir
        .join(format!("vanilla_{}_{}.json", kind.as_str(), tag));
    fs::create_dir_all(&cli.model_dir)
        .with_context(|| format!("creating {}", cli.model_dir.display()))?;

    for epoch in 0..cli.num_epochs {
        trainer.run_epoch(epoch, &train_data, test_data.as_ref());

        let is_last = epoch + 1 == cli.num_epochs;
        if cli.save_every > 0 && (epoch + 1) % cli.save_every == 0 && !is_last {
            save_checkpoint(&trainer, &checkpoint_path, &cli, epoch + 1)?;
            info!(
                "checkpoint after epoch {} saved to {}",
                epoch,
                checkpoint_path.display()
            );
        }
    }

    save_checkpoint(&trainer, &checkpoint_path, &cli, cli.num_epochs)?;
    info!("final checkpoint saved to {}", checkpoint_path.display());

    let report_config = ReportConfig {
        figures_dir: cli.figures_dir.clone(),
        stats_dir: cli.stats_dir.clone(),
        run_tag: tag,
    };
    write_reports(trainer.get_metrics_history(), &report_config)
        .context("writing run reports")?;

    Ok(())
}

fn save_checkpoint(
    trainer: &BoxedTrainer,
    path: &Path,
    cli: &Cli,
    epochs_done: usize,
) -> Result<()> {
    let mut metadata = CheckpointMetadata::new(
        format!("vanilla_{}", trainer.network.kind().as_str()),
        &trainer.network,
        cli.obs_len,
        cli.pred_len,
    );
    metadata.total_epochs = epochs_done;
    metadata.description = Some(format!("trained on {}", cli.train_dir.display()));
    if let Some(latest) = trainer.get_latest_metrics() {
        metadata.final_train_loss = Some(latest.train_loss);
        metadata.final_test_loss = latest.test_loss;
        metadata.final_test_avg_disp = latest.test_avg_disp;
        metadata.final_test_final_disp = latest.test_final_disp;
    }

    trainer
        .network
        .save(path, metadata)
        .with_context(|| format!("saving checkpoint to {}", path.display()))?;
    Ok(())
}

fn parse_delim(raw: &str) -> Result<char> {
    match raw {
        "tab" => Ok('\t'),
        "space" => Ok(' '),
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => anyhow::bail!(
                    "invalid delimiter {:?}; use \"tab\", \"space\", or a single character",
                    raw
                ),
            }
        }
    }
}
