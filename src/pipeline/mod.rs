pub mod control;
pub mod job;

pub use control::JobControl;
pub use job::{process_frames, process_video, ProcessSummary, ProgressObserver, TracingObserver};
