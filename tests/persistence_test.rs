use ndarray::{arr2, Array2};
use tempfile::tempdir;
use traj_lstm::dataset::TrajectoryBatch;
use traj_lstm::persistence::{CheckpointMetadata, PersistentModel};
use traj_lstm::training::create_basic_trainer;
use traj_lstm::{CellKind, VanillaNet};

fn observed_window(peds: usize, steps: usize) -> Vec<Array2<f64>> {
    (0..steps)
        .map(|t| {
            Array2::from_shape_fn((2, peds), |(coord, ped)| {
                0.2 * t as f64 + 0.1 * ped as f64 + if coord == 0 { 0.0 } else { 0.5 }
            })
        })
        .collect()
}

#[test]
fn test_checkpoint_metadata_creation() {
    let network = VanillaNet::new(CellKind::Lstm, 2, 16, 32, 2);
    let metadata = CheckpointMetadata::new("test_model", &network, 8, 12);

    assert_eq!(metadata.model_name, "test_model");
    assert_eq!(metadata.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(metadata.cell, CellKind::Lstm);
    assert_eq!(metadata.input_size, 2);
    assert_eq!(metadata.embedding_size, 16);
    assert_eq!(metadata.hidden_size, 32);
    assert_eq!(metadata.output_size, 2);
    assert_eq!(metadata.obs_len, 8);
    assert_eq!(metadata.pred_len, 12);
    assert_eq!(metadata.total_epochs, 0);
    assert_eq!(metadata.final_train_loss, None);
    assert_eq!(metadata.final_test_loss, None);
}

#[test]
fn test_network_save_load_json() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("test_model.json");

    let mut network = VanillaNet::new(CellKind::Lstm, 2, 6, 6, 2);

    // Roll out before saving so we can compare predictions afterwards.
    let observed = observed_window(3, 4);
    let predictions_before = network.forward(&observed, 5);

    let mut metadata = CheckpointMetadata::new("test_json_model", &network, 4, 5);
    metadata.description = Some("JSON persistence test".to_string());

    let result = network.save(&file_path, metadata.clone());
    assert!(result.is_ok());
    assert!(file_path.exists());

    let (mut loaded_network, loaded_metadata) = VanillaNet::load(&file_path).unwrap();

    // Verify metadata
    assert_eq!(loaded_metadata.model_name, metadata.model_name);
    assert_eq!(loaded_metadata.cell, CellKind::Lstm);
    assert_eq!(loaded_metadata.obs_len, 4);
    assert_eq!(loaded_metadata.pred_len, 5);
    assert_eq!(loaded_metadata.description, metadata.description);

    // Verify network structure
    assert_eq!(loaded_network.kind(), CellKind::Lstm);
    assert_eq!(loaded_network.input_size, 2);
    assert_eq!(loaded_network.embedding_size, 6);
    assert_eq!(loaded_network.hidden_size, 6);
    assert_eq!(loaded_network.output_size, 2);

    // The loaded network must predict the same rollout.
    let predictions_after = loaded_network.forward(&observed, 5);
    assert_eq!(predictions_before.len(), predictions_after.len());
    for (before, after) in predictions_before.iter().zip(predictions_after.iter()) {
        assert_eq!(before.shape(), after.shape());
        let diff = (before - after).mapv(|x| x.abs()).sum();
        assert!(diff < 1e-10, "loaded network predictions differ: {}", diff);
    }
}

#[test]
fn test_network_save_load_binary() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("test_model.bin");

    // Dropout is not persisted, so compare in eval mode where it is inert.
    let mut network = VanillaNet::new(CellKind::Gru, 2, 5, 5, 2).with_input_dropout(0.1);
    network.eval();

    let observed = observed_window(2, 3);
    let predictions_before = network.forward(&observed, 4);

    let mut metadata = CheckpointMetadata::new("test_binary_model", &network, 3, 4);
    metadata.total_epochs = 50;
    metadata.final_train_loss = Some(0.05);
    metadata.final_test_avg_disp = Some(0.4);

    let result = network.save(&file_path, metadata.clone());
    assert!(result.is_ok());
    assert!(file_path.exists());

    let (mut loaded_network, loaded_metadata) = VanillaNet::load(&file_path).unwrap();

    assert_eq!(loaded_metadata.model_name, metadata.model_name);
    assert_eq!(loaded_metadata.cell, CellKind::Gru);
    assert_eq!(loaded_metadata.total_epochs, 50);
    assert_eq!(loaded_metadata.final_train_loss, Some(0.05));
    assert_eq!(loaded_metadata.final_test_avg_disp, Some(0.4));

    assert_eq!(loaded_network.kind(), CellKind::Gru);
    loaded_network.eval();
    let predictions_after = loaded_network.forward(&observed, 4);
    for (before, after) in predictions_before.iter().zip(predictions_after.iter()) {
        let diff = (before - after).mapv(|x| x.abs()).sum();
        assert!(diff < 1e-10, "loaded network predictions differ: {}", diff);
    }
}

#[test]
fn test_persistence_with_trained_model() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("trained_model.json");

    let network = VanillaNet::new(CellKind::Lstm, 2, 4, 4, 2);
    let mut trainer = create_basic_trainer(network, 0.05);

    let batch = TrajectoryBatch {
        observed: vec![
            arr2(&[[0.0, 0.0], [0.0, 0.0]]),
            arr2(&[[0.1, 0.0], [0.0, 0.1]]),
            arr2(&[[0.2, 0.0], [0.0, 0.2]]),
        ],
        future: vec![
            arr2(&[[0.3, 0.0], [0.0, 0.3]]),
            arr2(&[[0.4, 0.0], [0.0, 0.4]]),
        ],
        peds: 2,
    };

    let mut last_loss = 0.0;
    for _ in 0..5 {
        last_loss = trainer.train_batch(&batch).loss;
    }

    let mut metadata = CheckpointMetadata::new("trained_test_model", &trainer.network, 3, 2);
    metadata.total_epochs = 5;
    metadata.final_train_loss = Some(last_loss);

    let save_result = trainer.network.save(&file_path, metadata);
    assert!(save_result.is_ok());

    let (mut loaded_network, loaded_metadata) = VanillaNet::load(&file_path).unwrap();
    assert_eq!(loaded_metadata.model_name, "trained_test_model");
    assert_eq!(loaded_metadata.total_epochs, 5);
    assert_eq!(loaded_metadata.final_train_loss, Some(last_loss));

    // The restored model predicts the same rollout as the trained one.
    trainer.network.eval();
    loaded_network.eval();
    let expected = trainer.network.forward(&batch.observed, 2);
    let restored = loaded_network.forward(&batch.observed, 2);
    for (a, b) in expected.iter().zip(restored.iter()) {
        assert_eq!(a.shape(), &[2, 2]);
        let diff = (a - b).mapv(|x| x.abs()).sum();
        assert!(diff < 1e-10);
    }
}

#[test]
fn test_file_extension_detection() {
    let dir = tempdir().unwrap();
    let network = VanillaNet::new(CellKind::Gru, 2, 4, 4, 2);
    let metadata = CheckpointMetadata::new("extension_test", &network, 8, 12);

    // JSON extension
    let json_path = dir.path().join("model.json");
    assert!(network.save(&json_path, metadata.clone()).is_ok());
    assert!(json_path.exists());

    // Binary extensions
    let bin_path = dir.path().join("model.bin");
    assert!(network.save(&bin_path, metadata.clone()).is_ok());
    assert!(bin_path.exists());

    let model_path = dir.path().join("model.model");
    assert!(network.save(&model_path, metadata.clone()).is_ok());
    assert!(model_path.exists());

    // Unknown extension defaults to binary
    let unknown_path = dir.path().join("model.xyz");
    assert!(network.save(&unknown_path, metadata).is_ok());
    assert!(unknown_path.exists());

    // JSON output is human-readable; binary is not JSON.
    let json_text = std::fs::read_to_string(&json_path).unwrap();
    assert!(json_text.trim_start().starts_with('{'));

    // All of them load back with the right cell kind.
    for path in [&json_path, &bin_path, &model_path, &unknown_path] {
        let (loaded, loaded_metadata) = VanillaNet::load(path).unwrap();
        assert_eq!(loaded.kind(), CellKind::Gru);
        assert_eq!(loaded_metadata.model_name, "extension_test");
    }
}

#[test]
fn test_error_handling() {
    // Loading a non-existent file fails
    let result = VanillaNet::load("/non/existent/path.json");
    assert!(result.is_err());

    // Saving to an invalid path fails gracefully
    let network = VanillaNet::new(CellKind::Lstm, 2, 4, 4, 2);
    let metadata = CheckpointMetadata::new("error_test", &network, 8, 12);
    let result = network.save("/invalid/path/that/does/not/exist.json", metadata);
    assert!(result.is_err());
}
