pub mod config;
pub mod error;
pub mod metrics;
pub mod mqtt;
pub mod pipeline;
pub mod plate_detection;
pub mod publisher;
pub mod utils;

pub use error::PlateError;
pub use error::Result;
