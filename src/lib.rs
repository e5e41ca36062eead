//! Nearest-in-time join of mobile air-quality measurements to phone GPS
//! fixes, and projection of the result onto a warehouse table.

pub mod config;
pub mod docstore;
pub mod error;
pub mod etl;
pub mod join;
pub mod model;
pub mod timestamp;
pub mod vendor;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use join::{merge, MergeConfig, MergeOutcome, MergeStats, MissingPositionPolicy};
pub use model::{Measurement, Pollutant, PositionFix, Reading};
pub use timestamp::RawTimestamp;
