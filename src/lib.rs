// Core modules
pub mod common;
pub mod core;
pub mod storage;
pub mod video;
pub mod pipeline;
pub mod cli;

// Re-export commonly used types
pub use common::{Config, DistanceMetric, FaceBlurError, Result, Workspace};
pub use crate::core::{
    BlurSettings, DetectFaces, EmbedFaces, Embedding, FaceBlurProcessor, FaceBox, FaceDetector,
    FaceRecognizer, FrameStats, Whitelist,
};
pub use pipeline::{process_video, JobControl, ProcessSummary, ProgressObserver};
pub use video::{FrameReader, FrameSink, FrameWriter, VideoInfo};
