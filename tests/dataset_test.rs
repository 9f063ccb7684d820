use std::fmt::Write as _;
use std::path::Path;
use tempfile::tempdir;
use traj_lstm::dataset::{DatasetConfig, DatasetError, TrajectoryDataset};

/// Write a tab-delimited trajectory file: one pedestrian per entry of
/// `walkers`, each walking at constant velocity for `frames` frames.
fn write_walk_file(path: &Path, frames: usize, walkers: &[(i64, f64, f64)]) {
    let mut contents = String::new();
    for frame in 0..frames {
        for &(ped, vx, vy) in walkers {
            writeln!(
                contents,
                "{:.1}\t{:.1}\t{:.2}\t{:.2}",
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

fn config(obs_len: usize, pred_len: usize) -> DatasetConfig {
    DatasetConfig {
        obs_len,
        pred_len,
        skip: 1,
        min_peds: 1,
        delim: '\t',
    }
}

#[test]
fn test_from_dir_loads_windows() {
    let dir = tempdir().unwrap();
    write_walk_file(&dir.path().join("walks.txt"), 25, &[(1, 0.4, 0.1)]);

    let dataset = TrajectoryDataset::from_dir(dir.path(), &config(8, 12)).unwrap();

    // 25 frames, window length 20, stride 1.
    assert_eq!(dataset.len(), 6);
    assert_eq!(dataset.obs_len(), 8);
    assert_eq!(dataset.pred_len(), 12);

    let window = &dataset.windows()[0];
    assert_eq!(window.observed.len(), 8);
    assert_eq!(window.future.len(), 12);
    assert_eq!(window.observed[0].shape(), &[2, 1]);
    // Frame 8 is the first future step of the first window.
    assert!((window.future[0][[0, 0]] - 3.2).abs() < 1e-9);
}

#[test]
fn test_from_dir_merges_files() {
    let dir = tempdir().unwrap();
    write_walk_file(&dir.path().join("a.txt"), 22, &[(1, 0.2, 0.0)]);
    write_walk_file(&dir.path().join("b.txt"), 21, &[(5, 0.0, 0.3), (6, 0.1, 0.1)]);

    let dataset = TrajectoryDataset::from_dir(dir.path(), &config(8, 12)).unwrap();

    // 3 windows from a.txt, 2 windows from b.txt.
    assert_eq!(dataset.len(), 5);
    assert_eq!(dataset.windows()[0].peds, 1);
    assert_eq!(dataset.windows()[3].peds, 2);
}

#[test]
fn test_space_delimited_files() {
    let dir = tempdir().unwrap();
    let mut contents = String::new();
    for frame in 0..6 {
        writeln!(contents, "{}.0 2.0 {}.5 0.0", frame, frame).unwrap();
    }
    std::fs::write(dir.path().join("walks.txt"), contents).unwrap();

    let mut cfg = config(3, 3);
    cfg.delim = ' ';
    let dataset = TrajectoryDataset::from_dir(dir.path(), &cfg).unwrap();
    assert_eq!(dataset.len(), 1);
}

#[test]
fn test_batches_concatenate_windows() {
    let dir = tempdir().unwrap();
    write_walk_file(&dir.path().join("walks.txt"), 23, &[(1, 0.1, 0.0), (2, 0.0, 0.1)]);

    let dataset = TrajectoryDataset::from_dir(dir.path(), &config(8, 12)).unwrap();
    assert_eq!(dataset.len(), 4);

    let batches = dataset.batches(3);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].peds, 6);
    assert_eq!(batches[0].observed[0].shape(), &[2, 6]);
    assert_eq!(batches[1].peds, 2);
    assert_eq!(batches[1].future[11].shape(), &[2, 2]);
}

#[test]
fn test_missing_directory_errors() {
    let result = TrajectoryDataset::from_dir("/nonexistent/trajectory/data", &config(8, 12));
    assert!(matches!(result, Err(DatasetError::Io { .. })));
}

#[test]
fn test_malformed_record_reports_line() {
    let dir = tempdir().unwrap();
    let contents = "0.0\t1.0\t0.0\t0.0\n1.0\t1.0\t0.1\t0.0\n2.0\t1.0\tnot_a_number\t0.0\n";
    std::fs::write(dir.path().join("bad.txt"), contents).unwrap();

    let result = TrajectoryDataset::from_dir(dir.path(), &config(2, 2));
    match result {
        Err(DatasetError::Parse { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected parse error, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn test_wrong_field_count_errors() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("bad.txt"), "0.0\t1.0\t0.0\n").unwrap();

    let result = TrajectoryDataset::from_dir(dir.path(), &config(2, 2));
    assert!(matches!(result, Err(DatasetError::Parse { line: 1, .. })));
}

#[test]
fn test_no_usable_windows_errors() {
    let dir = tempdir().unwrap();
    // Too few frames for an 8 + 12 window.
    write_walk_file(&dir.path().join("short.txt"), 10, &[(1, 0.1, 0.1)]);

    let result = TrajectoryDataset::from_dir(dir.path(), &config(8, 12));
    assert!(matches!(result, Err(DatasetError::Empty { .. })));
}

#[test]
fn test_blank_lines_are_skipped() {
    let dir = tempdir().unwrap();
    let mut contents = String::new();
    for frame in 0..6 {
        writeln!(contents, "{:.1}\t1.0\t{:.1}\t0.0", frame as f64, frame as f64).unwrap();
        contents.push('\n');
    }
    std::fs::write(dir.path().join("gaps.txt"), contents).unwrap();

    let dataset = TrajectoryDataset::from_dir(dir.path(), &config(3, 3)).unwrap();
    assert_eq!(dataset.len(), 1);
}
