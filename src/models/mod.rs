/// Module for the trajectory forecasting network.
pub mod vanilla;
