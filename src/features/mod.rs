//! Feature engineering pipeline
//!
//! Player rows -> rolling averages -> position aggregates -> pivoted
//! Team A vs Team B rows -> model-ready feature matrix. Every stage is a
//! pure function over its input; the same stages run at training time and
//! per prediction request.

pub mod aggregate;
pub mod assemble;
pub mod pipeline;
pub mod pivot;
pub mod rolling;

pub use aggregate::TeamMatchRecord;
pub use assemble::{FeatureFrame, TargetFrame};
pub use pipeline::FUTURE_MATCH_ID;
pub use rolling::RollingRecord;
