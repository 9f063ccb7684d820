use ndarray::arr2;
use std::fs;
use traj_lstm::models::vanilla::{CellKind, VanillaNet};
use traj_lstm::persistence::{CheckpointMetadata, PersistentModel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Checkpoint Inspection ===\n");

    let mut network = VanillaNet::new(CellKind::Lstm, 2, 8, 8, 2);
    println!(
        "model: {} cell, {} parameters",
        network.kind().as_str(),
        network.num_parameters()
    );

    let mut metadata = CheckpointMetadata::new("vanilla_lstm", &network, 8, 12);
    metadata.description = Some("inspection example".to_string());

    fs::create_dir_all("saved_models")?;
    let path = "saved_models/inspection_vanilla_lstm.json";
    network.save(path, metadata)?;

    let file_size = fs::metadata(path)?.len();
    println!("saved checkpoint to {} ({} bytes)\n", path, file_size);

    // Reload and show what the checkpoint records.
    let (mut restored, metadata) = VanillaNet::load(path)?;
    println!("metadata:");
    println!("  name:    {}", metadata.model_name);
    println!("  version: {}", metadata.version);
    println!("  created: {}", metadata.created_at);
    println!("  cell:    {:?}", metadata.cell);
    println!(
        "  sizes:   input {} -> embedding {} -> hidden {} -> output {}",
        metadata.input_size, metadata.embedding_size, metadata.hidden_size, metadata.output_size
    );
    println!(
        "  window:  {} observed + {} predicted steps",
        metadata.obs_len, metadata.pred_len
    );

    // Parameters must round-trip exactly: the reloaded model predicts the
    // same trajectory as the original.
    let observed = vec![
        arr2(&[[0.0], [0.0]]),
        arr2(&[[0.3], [0.1]]),
        arr2(&[[0.6], [0.2]]),
    ];
    let original_predictions = network.forward(&observed, 4);
    let restored_predictions = restored.forward(&observed, 4);

    let max_diff = original_predictions
        .iter()
        .zip(&restored_predictions)
        .map(|(a, b)| (a - b).iter().fold(0.0f64, |m, v| m.max(v.abs())))
        .fold(0.0f64, f64::max);
    println!("\nmax prediction difference after reload: {:.2e}", max_diff);

    let content = fs::read_to_string(path)?;
    println!("\nJSON structure (first 12 lines):");
    for line in content.lines().take(12) {
        println!("  {}", line);
    }

    Ok(())
}
