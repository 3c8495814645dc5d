use crate::common::{FaceBlurError, Result};
use crate::video::probe::spawn_error;
use crate::video::FrameSink;
use image::RgbImage;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Encodes RGB frames into a video file through an `ffmpeg` child process.
pub struct FrameWriter {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

/// Codec arguments picked from the output extension: XVID in AVI, `mp4v` in
/// MP4, ffmpeg's choice otherwise.
pub fn codec_args(path: &Path) -> Vec<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("avi") => vec!["-c:v", "mpeg4", "-vtag", "XVID", "-q:v", "3"],
        Some("mp4") | Some("m4v") | Some("mov") => vec!["-c:v", "mpeg4", "-vtag", "mp4v", "-q:v", "3"],
        _ => vec![],
    }
}

impl FrameWriter {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut child = Command::new("ffmpeg")
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format!("{}", fps))
            .arg("-i")
            .arg("-")
            .args(codec_args(path))
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(path.as_os_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_error("ffmpeg", e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FaceBlurError::Video("ffmpeg encoder has no stdin".into()))?;

        tracing::debug!("Encoding {} ({}x{} @ {:.2} fps)", path.display(), width, height, fps);

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            path: path.to_path_buf(),
            width,
            height,
            frames_written: 0,
        })
    }

    /// Closes the encoder input and waits for ffmpeg to finalise the file.
    pub fn finish(mut self) -> Result<u64> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().map_err(|e| self.pipe_error(e))?;
        }

        let status = self.child.wait()?;
        if !status.success() {
            return Err(FaceBlurError::Video(format!(
                "ffmpeg failed to write {} ({})",
                self.path.display(),
                status
            )));
        }
        Ok(self.frames_written)
    }

    fn pipe_error(&self, e: io::Error) -> FaceBlurError {
        if e.kind() == io::ErrorKind::BrokenPipe {
            FaceBlurError::Video(format!("ffmpeg encoder for {} exited early", self.path.display()))
        } else {
            FaceBlurError::Io(e)
        }
    }
}

impl FrameSink for FrameWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(FaceBlurError::Video(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(frame.as_raw()),
            None => return Err(FaceBlurError::Video("Encoder already finished".into())),
        };
        result.map_err(|e| self.pipe_error(e))?;

        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        // Dropping stdin lets ffmpeg see EOF instead of hanging
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}
