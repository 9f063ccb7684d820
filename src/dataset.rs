//! Trajectory dataset loading and windowing.
//!
//! Input files are delimited text, one record per line:
//! `frame_id <delim> ped_id <delim> x <delim> y`. Records are grouped by
//! frame, and fixed-length windows of `obs_len + pred_len` consecutive
//! frames are extracted. A pedestrian joins a window only when present in
//! every frame of it; a window is kept when at least `min_peds` pedestrians
//! survive that filter. Batching concatenates windows along the pedestrian
//! axis, so a batch is shaped exactly like a wider window.

use ndarray::{concatenate, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record at {path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("no usable windows under {path}")]
    Empty { path: PathBuf },
}

/// Windowing parameters.
#[derive(Clone, Debug)]
pub struct DatasetConfig {
    /// Observed steps fed to the model.
    pub obs_len: usize,
    /// Future steps to predict.
    pub pred_len: usize,
    /// Stride between window start frames.
    pub skip: usize,
    /// Minimum pedestrians a window must retain to be kept.
    pub min_peds: usize,
    /// Field delimiter; repeated delimiters collapse.
    pub delim: char,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            obs_len: 8,
            pred_len: 12,
            skip: 1,
            min_peds: 1,
            delim: '\t',
        }
    }
}

/// One extracted window: time-major (2, peds) coordinate matrices for the
/// observed and future segments.
#[derive(Clone, Debug)]
pub struct SequenceWindow {
    pub observed: Vec<Array2<f64>>,
    pub future: Vec<Array2<f64>>,
    pub peds: usize,
}

/// A batch of windows concatenated along the pedestrian axis.
#[derive(Clone, Debug)]
pub struct TrajectoryBatch {
    pub observed: Vec<Array2<f64>>,
    pub future: Vec<Array2<f64>>,
    pub peds: usize,
}

/// All windows extracted from a directory of trajectory files.
pub struct TrajectoryDataset {
    windows: Vec<SequenceWindow>,
    obs_len: usize,
    pred_len: usize,
}

impl TrajectoryDataset {
    /// Load every file directly under `dir` and extract windows from each.
    /// Files are visited in path order so the window sequence is stable.
    pub fn from_dir(dir: impl AsRef<Path>, config: &DatasetConfig) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| DatasetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut windows = Vec::new();
        for path in &paths {
            let records = read_records(path, config.delim)?;
            let file_windows = windows_from_records(&records, config);
            debug!(
                "{}: {} records, {} windows",
                path.display(),
                records.len(),
                file_windows.len()
            );
            windows.extend(file_windows);
        }

        if windows.is_empty() {
            return Err(DatasetError::Empty {
                path: dir.to_path_buf(),
            });
        }

        let total_peds: usize = windows.iter().map(|w| w.peds).sum();
        info!(
            "loaded {} windows ({} pedestrian tracks) from {} files in {}",
            windows.len(),
            total_peds,
            paths.len(),
            dir.display()
        );

        Ok(TrajectoryDataset {
            windows,
            obs_len: config.obs_len,
            pred_len: config.pred_len,
        })
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn obs_len(&self) -> usize {
        self.obs_len
    }

    pub fn pred_len(&self) -> usize {
        self.pred_len
    }

    pub fn windows(&self) -> &[SequenceWindow] {
        &self.windows
    }

    /// Group consecutive windows into batches of up to `batch_size`,
    /// concatenated along the pedestrian axis. The final batch keeps the
    /// remainder.
    pub fn batches(&self, batch_size: usize) -> Vec<TrajectoryBatch> {
        let order: Vec<usize> = (0..self.windows.len()).collect();
        self.batch_order(&order, batch_size)
    }

    /// Like [`TrajectoryDataset::batches`], but windows are reshuffled
    /// first so batch composition changes between epochs.
    pub fn shuffled_batches<R: Rng>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Vec<TrajectoryBatch> {
        let mut order: Vec<usize> = (0..self.windows.len()).collect();
        order.shuffle(rng);
        self.batch_order(&order, batch_size)
    }

    fn batch_order(&self, order: &[usize], batch_size: usize) -> Vec<TrajectoryBatch> {
        assert!(batch_size > 0, "batch_size must be at least 1");

        order
            .chunks(batch_size)
            .map(|chunk| {
                let members: Vec<&SequenceWindow> =
                    chunk.iter().map(|&idx| &self.windows[idx]).collect();
                let observed = (0..self.obs_len)
                    .map(|t| concat_step(&members, |w| &w.observed[t]))
                    .collect();
                let future = (0..self.pred_len)
                    .map(|t| concat_step(&members, |w| &w.future[t]))
                    .collect();
                let peds = members.iter().map(|w| w.peds).sum();
                TrajectoryBatch {
                    observed,
                    future,
                    peds,
                }
            })
            .collect()
    }
}

fn concat_step<'a, F>(members: &[&'a SequenceWindow], step: F) -> Array2<f64>
where
    F: Fn(&'a SequenceWindow) -> &'a Array2<f64>,
{
    let views: Vec<_> = members.iter().map(|&w| step(w).view()).collect();
    concatenate(Axis(1), &views).expect("windows share the coordinate dimension")
}

/// Parse one file into (frame, ped, x, y) records. Blank lines are skipped;
/// anything else malformed is an error with its line number.
fn read_records(path: &Path, delim: char) -> Result<Vec<(i64, i64, f64, f64)>, DatasetError> {
    let contents = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line
            .split(delim)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != 4 {
            return Err(DatasetError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("expected 4 fields, got {}", fields.len()),
            });
        }

        let mut values = [0.0f64; 4];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = field.parse().map_err(|_| DatasetError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("invalid number {:?}", field),
            })?;
        }

        // Frame and pedestrian ids are written as floats in the common
        // benchmark files.
        records.push((
            values[0].round() as i64,
            values[1].round() as i64,
            values[2],
            values[3],
        ));
    }

    Ok(records)
}

/// Slide a window of `obs_len + pred_len` consecutive frames over the sorted
/// unique frame list, keeping pedestrians present across each whole window.
fn windows_from_records(
    records: &[(i64, i64, f64, f64)],
    config: &DatasetConfig,
) -> Vec<SequenceWindow> {
    let seq_len = config.obs_len + config.pred_len;
    let skip = config.skip.max(1);

    // Group positions by frame; BTreeMap keeps frames sorted.
    let mut frames: BTreeMap<i64, HashMap<i64, (f64, f64)>> = BTreeMap::new();
    for &(frame, ped, x, y) in records {
        frames.entry(frame).or_default().insert(ped, (x, y));
    }
    let frame_maps: Vec<&HashMap<i64, (f64, f64)>> = frames.values().collect();

    let mut windows = Vec::new();
    if frame_maps.len() < seq_len {
        return windows;
    }

    let mut start = 0;
    while start + seq_len <= frame_maps.len() {
        let span = &frame_maps[start..start + seq_len];

        // A pedestrian qualifies only when present in every frame of the
        // window; candidates are limited to those in the first frame.
        let mut peds: Vec<i64> = span[0]
            .keys()
            .copied()
            .filter(|ped| span.iter().all(|frame| frame.contains_key(ped)))
            .collect();
        peds.sort_unstable();

        if peds.len() >= config.min_peds && !peds.is_empty() {
            let step_matrix = |frame: &HashMap<i64, (f64, f64)>| {
                Array2::from_shape_fn((2, peds.len()), |(coord, idx)| {
                    let (x, y) = frame[&peds[idx]];
                    if coord == 0 {
                        x
                    } else {
                        y
                    }
                })
            };

            let observed = span[..config.obs_len].iter().map(|f| step_matrix(f)).collect();
            let future = span[config.obs_len..].iter().map(|f| step_matrix(f)).collect();
            windows.push(SequenceWindow {
                observed,
                future,
                peds: peds.len(),
            });
        }

        start += skip;
    }

    windows
}
