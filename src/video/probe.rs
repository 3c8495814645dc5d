use crate::common::{FaceBlurError, Result};
use serde_json::Value;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Used when the container reports no usable frame rate.
const FALLBACK_FPS: f64 = 25.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Estimated number of frames; 0 when unknown.
    pub frame_count: u64,
}

impl VideoInfo {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Reads the first video stream's geometry, rate and length with `ffprobe`.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    if !path.is_file() {
        return Err(FaceBlurError::Video(format!("Failed to open video: {}", path.display())));
    }

    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg(
            "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration\
             :stream_tags=rotate:stream_side_data=rotation:format=duration",
        )
        .arg("-print_format")
        .arg("json")
        .arg(path.as_os_str())
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error("ffprobe", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FaceBlurError::Video(format!(
            "Failed to open video {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    let info = parse_probe_json(&output.stdout)?;
    tracing::debug!("Probed {}: {:?}", path.display(), info);
    Ok(info)
}

pub fn parse_probe_json(bytes: &[u8]) -> Result<VideoInfo> {
    let v: Value = serde_json::from_slice(bytes)
        .map_err(|e| FaceBlurError::Video(format!("Unreadable ffprobe output: {}", e)))?;

    let stream = v["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .ok_or_else(|| FaceBlurError::Video("Failed to open video: no video stream".into()))?;

    let coded_width = stream["width"].as_u64().unwrap_or(0) as u32;
    let coded_height = stream["height"].as_u64().unwrap_or(0) as u32;
    if coded_width == 0 || coded_height == 0 {
        return Err(FaceBlurError::Video("Failed to open video: unknown frame size".into()));
    }

    // The decoder autorotates, so quarter-turn videos come out transposed
    let (width, height) = match rotation(stream) {
        90 | 270 => (coded_height, coded_width),
        _ => (coded_width, coded_height),
    };

    let fps = [&stream["r_frame_rate"], &stream["avg_frame_rate"]]
        .into_iter()
        .filter_map(|rate| rate.as_str().and_then(parse_rate))
        .next()
        .unwrap_or_else(|| {
            tracing::warn!("No frame rate reported, assuming {} fps", FALLBACK_FPS);
            FALLBACK_FPS
        });

    let frame_count = number_field(&stream["nb_frames"])
        .map(|n| n as u64)
        .or_else(|| {
            number_field(&stream["duration"])
                .or_else(|| number_field(&v["format"]["duration"]))
                .map(|secs| (secs * fps).round() as u64)
        })
        .unwrap_or(0);

    Ok(VideoInfo { width, height, fps, frame_count })
}

/// Display rotation in degrees, normalised to 0..360. Newer ffprobe reports
/// it in the display matrix side data, older builds as a `rotate` tag.
fn rotation(stream: &Value) -> i64 {
    let side_data = stream["side_data_list"]
        .as_array()
        .into_iter()
        .flatten()
        .find_map(|entry| number_field(&entry["rotation"]));

    side_data
        .or_else(|| number_field(&stream["tags"]["rotate"]))
        .map(|degrees| (degrees.round() as i64).rem_euclid(360))
        .unwrap_or(0)
}

/// `"30000/1001"` or `"25"`; zero and malformed rates are `None`.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

// ffprobe prints most numbers as JSON strings
fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

pub(crate) fn spawn_error(tool: &str, e: io::Error) -> FaceBlurError {
    if e.kind() == io::ErrorKind::NotFound {
        FaceBlurError::ToolMissing(tool.to_string())
    } else {
        FaceBlurError::Io(e)
    }
}

/// Whether `tool -version` runs successfully.
pub fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
