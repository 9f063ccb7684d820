/// Module for the fully connected layer.
pub mod linear;

/// Module for the LSTM cell.
pub mod lstm_cell;

/// Module for the GRU cell.
pub mod gru_cell;

/// Module for dropout regularization.
pub mod dropout;
