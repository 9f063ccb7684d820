//! Checkpoint saving and loading.
//!
//! Model parameters are copied into plain serializable mirrors so the
//! on-disk format stays independent of the in-memory layout. Dropout
//! configuration is not persisted; reloaded models run without it.

use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::layers::gru_cell::GRUCell;
use crate::layers::linear::LinearLayer;
use crate::layers::lstm_cell::LSTMCell;
use crate::models::vanilla::{CellKind, RecurrentCell, VanillaNet};

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl Into<Array2<f64>> for SerializableArray2 {
    fn into(self) -> Array2<f64> {
        Array2::from_shape_vec(self.shape, self.data)
            .expect("Failed to reconstruct Array2 from serialized data")
    }
}

/// Serializable linear layer parameters
#[derive(Serialize, Deserialize)]
pub struct SerializableLinear {
    weight: SerializableArray2,
    bias: SerializableArray2,
    input_size: usize,
    output_size: usize,
}

impl From<&LinearLayer> for SerializableLinear {
    fn from(layer: &LinearLayer) -> Self {
        Self {
            weight: (&layer.weight).into(),
            bias: (&layer.bias).into(),
            input_size: layer.input_size,
            output_size: layer.output_size,
        }
    }
}

impl Into<LinearLayer> for SerializableLinear {
    fn into(self) -> LinearLayer {
        LinearLayer {
            weight: self.weight.into(),
            bias: self.bias.into(),
            input_size: self.input_size,
            output_size: self.output_size,
        }
    }
}

/// Serializable LSTM cell parameters
#[derive(Serialize, Deserialize)]
pub struct SerializableLSTMCell {
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    b_ih: SerializableArray2,
    b_hh: SerializableArray2,
    hidden_size: usize,
}

impl From<&LSTMCell> for SerializableLSTMCell {
    fn from(cell: &LSTMCell) -> Self {
        Self {
            w_ih: (&cell.w_ih).into(),
            w_hh: (&cell.w_hh).into(),
            b_ih: (&cell.b_ih).into(),
            b_hh: (&cell.b_hh).into(),
            hidden_size: cell.hidden_size,
        }
    }
}

impl Into<LSTMCell> for SerializableLSTMCell {
    fn into(self) -> LSTMCell {
        LSTMCell {
            w_ih: self.w_ih.into(),
            w_hh: self.w_hh.into(),
            b_ih: self.b_ih.into(),
            b_hh: self.b_hh.into(),
            hidden_size: self.hidden_size,
            input_dropout: None,
            is_training: true,
        }
    }
}

/// Serializable GRU cell parameters
#[derive(Serialize, Deserialize)]
pub struct SerializableGRUCell {
    w_ir: SerializableArray2,
    w_hr: SerializableArray2,
    b_ir: SerializableArray2,
    b_hr: SerializableArray2,
    w_iz: SerializableArray2,
    w_hz: SerializableArray2,
    b_iz: SerializableArray2,
    b_hz: SerializableArray2,
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    b_ih: SerializableArray2,
    b_hh: SerializableArray2,
    hidden_size: usize,
}

impl From<&GRUCell> for SerializableGRUCell {
    fn from(cell: &GRUCell) -> Self {
        Self {
            w_ir: (&cell.w_ir).into(),
            w_hr: (&cell.w_hr).into(),
            b_ir: (&cell.b_ir).into(),
            b_hr: (&cell.b_hr).into(),
            w_iz: (&cell.w_iz).into(),
            w_hz: (&cell.w_hz).into(),
            b_iz: (&cell.b_iz).into(),
            b_hz: (&cell.b_hz).into(),
            w_ih: (&cell.w_ih).into(),
            w_hh: (&cell.w_hh).into(),
            b_ih: (&cell.b_ih).into(),
            b_hh: (&cell.b_hh).into(),
            hidden_size: cell.hidden_size,
        }
    }
}

impl Into<GRUCell> for SerializableGRUCell {
    fn into(self) -> GRUCell {
        GRUCell {
            w_ir: self.w_ir.into(),
            w_hr: self.w_hr.into(),
            b_ir: self.b_ir.into(),
            b_hr: self.b_hr.into(),
            w_iz: self.w_iz.into(),
            w_hz: self.w_hz.into(),
            b_iz: self.b_iz.into(),
            b_hz: self.b_hz.into(),
            w_ih: self.w_ih.into(),
            w_hh: self.w_hh.into(),
            b_ih: self.b_ih.into(),
            b_hh: self.b_hh.into(),
            hidden_size: self.hidden_size,
            input_dropout: None,
            is_training: true,
        }
    }
}

/// Serializable recurrent cell, tagged by kind
#[derive(Serialize, Deserialize)]
pub enum SerializableCell {
    Lstm(SerializableLSTMCell),
    Gru(SerializableGRUCell),
}

impl From<&RecurrentCell> for SerializableCell {
    fn from(cell: &RecurrentCell) -> Self {
        match cell {
            RecurrentCell::Lstm(c) => SerializableCell::Lstm(c.into()),
            RecurrentCell::Gru(c) => SerializableCell::Gru(c.into()),
        }
    }
}

impl Into<RecurrentCell> for SerializableCell {
    fn into(self) -> RecurrentCell {
        match self {
            SerializableCell::Lstm(c) => RecurrentCell::Lstm(c.into()),
            SerializableCell::Gru(c) => RecurrentCell::Gru(c.into()),
        }
    }
}

/// Serializable trajectory network
#[derive(Serialize, Deserialize)]
pub struct SerializableVanillaNet {
    embedding: SerializableLinear,
    cell: SerializableCell,
    output: SerializableLinear,
    input_size: usize,
    embedding_size: usize,
    hidden_size: usize,
    output_size: usize,
}

impl From<&VanillaNet> for SerializableVanillaNet {
    fn from(network: &VanillaNet) -> Self {
        Self {
            embedding: (&network.embedding).into(),
            cell: (&network.cell).into(),
            output: (&network.output).into(),
            input_size: network.input_size,
            embedding_size: network.embedding_size,
            hidden_size: network.hidden_size,
            output_size: network.output_size,
        }
    }
}

impl Into<VanillaNet> for SerializableVanillaNet {
    fn into(self) -> VanillaNet {
        VanillaNet {
            embedding: self.embedding.into(),
            cell: self.cell.into(),
            output: self.output.into(),
            input_size: self.input_size,
            embedding_size: self.embedding_size,
            hidden_size: self.hidden_size,
            output_size: self.output_size,
            is_training: true,
        }
    }
}

/// Checkpoint metadata for tracking training information
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub cell: CellKind,
    pub input_size: usize,
    pub embedding_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub obs_len: usize,
    pub pred_len: usize,
    pub total_epochs: usize,
    pub final_train_loss: Option<f64>,
    pub final_test_loss: Option<f64>,
    pub final_test_avg_disp: Option<f64>,
    pub final_test_final_disp: Option<f64>,
    pub description: Option<String>,
}

impl CheckpointMetadata {
    /// Fresh metadata for a network; epoch counts and final metrics start
    /// empty and are filled in as training progresses.
    pub fn new(
        model_name: impl Into<String>,
        network: &VanillaNet,
        obs_len: usize,
        pred_len: usize,
    ) -> Self {
        CheckpointMetadata {
            model_name: model_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            cell: network.kind(),
            input_size: network.input_size,
            embedding_size: network.embedding_size,
            hidden_size: network.hidden_size,
            output_size: network.output_size,
            obs_len,
            pred_len,
            total_epochs: 0,
            final_train_loss: None,
            final_test_loss: None,
            final_test_avg_disp: None,
            final_test_final_disp: None,
            description: None,
        }
    }
}

/// Complete checkpoint including network parameters and metadata
#[derive(Serialize, Deserialize)]
pub struct Checkpoint {
    pub model: SerializableVanillaNet,
    pub metadata: CheckpointMetadata,
}

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary error: {0}")]
    Binary(#[from] bincode::Error),
}

/// Checkpoint persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save checkpoint to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(
        checkpoint: &Checkpoint,
        path: P,
    ) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load checkpoint from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Checkpoint, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let checkpoint = serde_json::from_str(&contents)?;
        Ok(checkpoint)
    }

    /// Save checkpoint to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(
        checkpoint: &Checkpoint,
        path: P,
    ) -> Result<(), PersistenceError> {
        let encoded = bincode::serialize(checkpoint)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load checkpoint from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<Checkpoint, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let checkpoint = bincode::deserialize(&contents)?;
        Ok(checkpoint)
    }
}

/// Convenience trait for easy model saving/loading
pub trait PersistentModel {
    /// Save model to file (format determined by file extension)
    fn save<P: AsRef<Path>>(
        &self,
        path: P,
        metadata: CheckpointMetadata,
    ) -> Result<(), PersistenceError>;

    /// Load model from file (format determined by file extension)
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, CheckpointMetadata), PersistenceError>
    where
        Self: Sized;
}

impl PersistentModel for VanillaNet {
    fn save<P: AsRef<Path>>(
        &self,
        path: P,
        metadata: CheckpointMetadata,
    ) -> Result<(), PersistenceError> {
        let checkpoint = Checkpoint {
            model: self.into(),
            metadata,
        };

        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|s| s.to_str()) {
            Some("json") => ModelPersistence::save_to_json(&checkpoint, path),
            Some("bin") | Some("model") => ModelPersistence::save_to_binary(&checkpoint, path),
            _ => ModelPersistence::save_to_binary(&checkpoint, path), // Default to binary
        }
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, CheckpointMetadata), PersistenceError> {
        let path_ref = path.as_ref();
        let checkpoint = match path_ref.extension().and_then(|s| s.to_str()) {
            Some("json") => ModelPersistence::load_from_json(path)?,
            Some("bin") | Some("model") => ModelPersistence::load_from_binary(path)?,
            _ => ModelPersistence::load_from_binary(path)?, // Default to binary
        };

        Ok((checkpoint.model.into(), checkpoint.metadata))
    }
}
