use ndarray::Array2;
use rand::Rng;
use traj_lstm::dataset::TrajectoryBatch;
use traj_lstm::loss::MSELoss;
use traj_lstm::metrics::{average_displacement_error, final_displacement_error, RunningStats};
use traj_lstm::models::vanilla::{CellKind, VanillaNet};
use traj_lstm::optimizers::Adam;
use traj_lstm::training::TrajectoryTrainer;

/// Generate batches of pedestrians walking at constant velocity from random
/// start positions.
fn synthetic_batches(
    num_batches: usize,
    peds: usize,
    obs_len: usize,
    pred_len: usize,
) -> Vec<TrajectoryBatch> {
    let mut rng = rand::thread_rng();
    let mut batches = Vec::new();

    for _ in 0..num_batches {
        let starts: Vec<(f64, f64)> = (0..peds)
            .map(|_| (rng.gen_range(-4.0..4.0), rng.gen_range(-4.0..4.0)))
            .collect();
        let velocities: Vec<(f64, f64)> = (0..peds)
            .map(|_| (rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)))
            .collect();

        let step = |t: usize| -> Array2<f64> {
            Array2::from_shape_fn((2, peds), |(coord, p)| {
                let (x0, y0) = starts[p];
                let (vx, vy) = velocities[p];
                if coord == 0 {
                    x0 + vx * t as f64
                } else {
                    y0 + vy * t as f64
                }
            })
        };

        let observed = (0..obs_len).map(|t| step(t)).collect();
        let future = (obs_len..obs_len + pred_len).map(|t| step(t)).collect();
        batches.push(TrajectoryBatch {
            observed,
            future,
            peds,
        });
    }

    batches
}

/// Train one cell kind on the given batches and report its displacement
/// errors on a held-out batch.
fn train_cell(
    kind: CellKind,
    train_batches: &[TrajectoryBatch],
    test_batch: &TrajectoryBatch,
    epochs: usize,
) -> (f64, f64) {
    let network = VanillaNet::new(kind, 2, 16, 16, 2);
    let mut trainer = TrajectoryTrainer::new(network, MSELoss, Adam::new(0.01));

    for epoch in 0..epochs {
        let mut losses = RunningStats::new();
        for batch in train_batches {
            losses.push(trainer.train_batch(batch).loss);
        }
        if epoch % 5 == 0 || epoch + 1 == epochs {
            println!(
                "  [{}] epoch {:2}: avg loss {:.6}",
                kind.as_str(),
                epoch,
                losses.mean()
            );
        }
    }

    trainer.network.eval();
    let predictions = trainer
        .network
        .forward(&test_batch.observed, test_batch.future.len());
    (
        average_displacement_error(&predictions, &test_batch.future),
        final_displacement_error(&predictions, &test_batch.future),
    )
}

fn main() {
    println!("=== Trajectory Training on Synthetic Walks ===\n");

    let obs_len = 8;
    let pred_len = 12;
    let train_batches = synthetic_batches(20, 3, obs_len, pred_len);
    let test_batch = &synthetic_batches(1, 3, obs_len, pred_len)[0];

    println!(
        "Generated {} training batches of {} pedestrians ({} observed + {} predicted steps)\n",
        train_batches.len(),
        3,
        obs_len,
        pred_len
    );

    println!("Training with LSTM cell:");
    let (lstm_avg, lstm_final) = train_cell(CellKind::Lstm, &train_batches, test_batch, 15);

    println!("\nTraining with GRU cell:");
    let (gru_avg, gru_final) = train_cell(CellKind::Gru, &train_batches, test_batch, 15);

    println!("\n=== Held-out Displacement Errors ===");
    println!("LSTM - avgD: {:.4}, finalD: {:.4}", lstm_avg, lstm_final);
    println!("GRU  - avgD: {:.4}, finalD: {:.4}", gru_avg, gru_final);

    if gru_final < lstm_final {
        println!("GRU tracked the walkers more closely!");
    } else {
        println!("LSTM tracked the walkers more closely!");
    }
}
