use crate::common::{FaceBlurError, Result};
use crate::core::detector::DetectFaces;
use crate::core::processor::{FaceBlurProcessor, FrameReport, FrameStats};
use crate::core::recognizer::EmbedFaces;
use crate::pipeline::control::JobControl;
use crate::video::{self, FrameReader, FrameSink, FrameWriter};
use image::RgbImage;
use std::path::Path;
use std::time::{Duration, Instant};

/// Callbacks a front-end uses to follow a running job.
pub trait ProgressObserver {
    /// `percent` is `None` when the total frame count is unknown.
    fn on_progress(&mut self, _percent: Option<u8>, _status: &str) {}

    fn on_log(&mut self, _message: &str) {}

    /// Called with every processed frame before it is written.
    fn on_frame(&mut self, _frame: &RgbImage, _report: &FrameReport) {}
}

/// Sends job messages to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingObserver {
    last_percent: Option<u8>,
}

impl ProgressObserver for TracingObserver {
    fn on_progress(&mut self, percent: Option<u8>, status: &str) {
        // One line per ten percent is plenty for a log file
        let bucket = percent.map(|p| p / 10);
        if bucket != self.last_percent.map(|p| p / 10) {
            tracing::info!("{}", status);
        }
        self.last_percent = percent;
    }

    fn on_log(&mut self, message: &str) {
        tracing::info!("{}", message);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessSummary {
    pub frames_processed: u64,
    pub total_frames: u64,
    pub faces: FrameStats,
    pub frame_errors: u64,
    pub elapsed: Duration,
    pub stopped: bool,
}

impl ProcessSummary {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames_processed as f64 / secs
        } else {
            0.0
        }
    }
}

pub fn progress_percent(done: u64, total: u64) -> Option<u8> {
    (total > 0).then(|| (done.saturating_mul(100) / total).min(100) as u8)
}

pub fn status_line(done: u64, total: u64, fps: f64) -> String {
    if total > 0 {
        format!("Processing: {}/{} | FPS: {:.2}", done, total, fps)
    } else {
        format!("Processing: {} | FPS: {:.2}", done, fps)
    }
}

/// Runs every frame from `frames` through the processor into `sink`.
///
/// A frame the processor fails on is logged and written unchanged. Source and
/// sink errors abort the job.
pub fn process_frames<D, E, I, S, O>(
    processor: &FaceBlurProcessor<D, E>,
    frames: I,
    total_frames: u64,
    sink: &mut S,
    control: &JobControl,
    observer: &mut O,
) -> Result<ProcessSummary>
where
    D: DetectFaces,
    E: EmbedFaces,
    I: IntoIterator<Item = Result<RgbImage>>,
    S: FrameSink + ?Sized,
    O: ProgressObserver + ?Sized,
{
    if processor.whitelist().is_empty() {
        let err = FaceBlurError::EmptyWhitelist;
        observer.on_log(&err.to_string());
        return Err(err);
    }

    let start = Instant::now();
    let mut summary = ProcessSummary { total_frames, ..Default::default() };

    for frame in frames {
        if control.is_stopped() || !control.wait_while_paused() {
            summary.stopped = true;
            break;
        }

        let mut frame = frame?;
        let frame_idx = summary.frames_processed;

        match processor.detect_and_blur_faces(&mut frame) {
            Ok(report) => {
                summary.faces += report.stats;
                observer.on_frame(&frame, &report);
            }
            Err(e) => {
                summary.frame_errors += 1;
                observer.on_log(&format!("Error on frame {}: {}", frame_idx, e));
            }
        }

        sink.write_frame(&frame)?;
        summary.frames_processed += 1;

        let elapsed = start.elapsed();
        let fps = summary.frames_processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        observer.on_progress(
            progress_percent(summary.frames_processed, total_frames),
            &status_line(summary.frames_processed, total_frames, fps),
        );
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Blurs non-whitelisted faces in `input` and writes the result to `output`.
///
/// The output is finalised even when the job is stopped early.
pub fn process_video<D, E, O>(
    input: &Path,
    output: &Path,
    processor: &FaceBlurProcessor<D, E>,
    control: &JobControl,
    observer: &mut O,
) -> Result<ProcessSummary>
where
    D: DetectFaces,
    E: EmbedFaces,
    O: ProgressObserver + ?Sized,
{
    if processor.whitelist().is_empty() {
        let err = FaceBlurError::EmptyWhitelist;
        observer.on_log(&err.to_string());
        return Err(err);
    }

    let info = match video::probe(input) {
        Ok(info) => info,
        Err(e) => {
            observer.on_log("Failed to open video.");
            return Err(e);
        }
    };

    if info.frame_count > 0 {
        observer.on_log(&format!("Processing {} frames...", info.frame_count));
    } else {
        observer.on_log("Processing video (frame count unknown)...");
    }

    let reader = FrameReader::open(input, &info)?;
    let mut writer = FrameWriter::create(output, info.width, info.height, info.fps)?;

    let summary = process_frames(processor, reader, info.frame_count, &mut writer, control, observer)?;
    writer.finish()?;

    if summary.stopped {
        observer.on_log(&format!(
            "Processing stopped after {} frames. Partial video saved to {}",
            summary.frames_processed,
            output.display()
        ));
    } else {
        observer.on_log(&format!("Video saved to {}", output.display()));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_only_with_known_total() {
        assert_eq!(progress_percent(1, 3), Some(33));
        assert_eq!(progress_percent(3, 3), Some(100));
        assert_eq!(progress_percent(5, 3), Some(100));
        assert_eq!(progress_percent(5, 0), None);
    }

    #[test]
    fn status_line_format() {
        assert_eq!(status_line(10, 100, 24.5), "Processing: 10/100 | FPS: 24.50");
        assert_eq!(status_line(10, 0, 1.0), "Processing: 10 | FPS: 1.00");
    }
}
