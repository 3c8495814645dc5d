pub mod probe;
pub mod reader;
pub mod writer;

pub use probe::{probe, tool_available, VideoInfo};
pub use reader::FrameReader;
pub use writer::FrameWriter;

use crate::common::Result;
use image::RgbImage;

/// Destination for processed frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;
}

impl FrameSink for Vec<RgbImage> {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}
