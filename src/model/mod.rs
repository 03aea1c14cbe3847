pub mod aggregator;
pub mod calibration;
pub mod classifier;
pub mod features;
pub mod lineup;
pub mod predictor;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

pub use predictor::{train, Prediction, TrainOptions, TrainedModel};
pub use store::ModelStore;
