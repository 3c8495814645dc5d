use crate::common::{FaceBlurError, Result};
use crate::video::probe::{spawn_error, VideoInfo};
use image::RgbImage;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

/// Decodes a video into RGB frames through an `ffmpeg` child process.
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frames_read: u64,
    finished: bool,
}

impl FrameReader {
    pub fn open(path: &Path, info: &VideoInfo) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(path.as_os_str())
            .arg("-map")
            .arg("0:v:0")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_error("ffmpeg", e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FaceBlurError::Video("ffmpeg decoder has no stdout".into()))?;

        tracing::debug!("Decoding {} ({}x{})", path.display(), info.width, info.height);

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(info.frame_bytes().max(8192), stdout),
            width: info.width,
            height: info.height,
            frames_read: 0,
            finished: false,
        })
    }

    /// Next frame, or `None` at the end of the stream.
    pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match read_frame_bytes(&mut self.stdout, &mut buf) {
            Ok(true) => {}
            Ok(false) => {
                self.finished = true;
                return Ok(None);
            }
            Err(e) => {
                self.finished = true;
                return Err(FaceBlurError::Video(format!(
                    "Truncated frame {} from decoder: {}",
                    self.frames_read, e
                )));
            }
        }

        self.frames_read += 1;
        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| FaceBlurError::Video("Decoded frame has the wrong size".into()))
    }
}

impl Iterator for FrameReader {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        // Stopping early leaves ffmpeg blocked on a full pipe
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Fills `buf` completely. `Ok(false)` on a clean end of stream before any
/// byte was read; a stream ending mid-frame is `UnexpectedEof`.
pub(crate) fn read_frame_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("got {} of {} bytes", n, buf.len()),
        )),
    }
}
