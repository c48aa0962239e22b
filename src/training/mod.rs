//! Model training

pub mod metrics;
pub mod trainer;

pub use metrics::{r_squared, Metrics, TrainingHistory};
pub use trainer::{train, Standardization};
