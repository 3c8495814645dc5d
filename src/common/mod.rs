pub mod config;
pub mod error;
pub mod paths;

pub use config::{Config, DistanceMetric};
pub use error::{FaceBlurError, Result};
pub use paths::Workspace;
