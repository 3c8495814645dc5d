use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FaceBlurError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/face-blur.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub blur: BlurConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
    #[serde(default = "default_recognizer_path")]
    pub recognizer_path: PathBuf,
}

fn default_detector_path() -> PathBuf { PathBuf::from("face_detector.onnx") }
fn default_recognizer_path() -> PathBuf { PathBuf::from("face_recognizer.onnx") }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: default_detector_path(),
            recognizer_path: default_recognizer_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_size")]
    pub input_width: u32,
    #[serde(default = "default_detector_size")]
    pub input_height: u32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou: f32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
}

fn default_detector_size() -> u32 { 640 }
fn default_confidence() -> f32 { 0.9 }
fn default_nms_iou() -> f32 { 0.45 }
fn default_max_faces() -> usize { 20 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_size(),
            input_height: default_detector_size(),
            confidence: default_confidence(),
            nms_iou: default_nms_iou(),
            max_faces: default_max_faces(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_recognizer_size")]
    pub input_size: u32,
    #[serde(default = "default_normalization_value")]
    pub normalization_value: f32,
}

fn default_recognizer_size() -> u32 { 112 }
fn default_normalization_value() -> f32 { 127.5 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: default_recognizer_size(),
            normalization_value: default_normalization_value(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    Cosine,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_true")]
    pub normalize: bool,
}

fn default_metric() -> DistanceMetric { DistanceMetric::Euclidean }
fn default_threshold() -> f32 { 0.5 }
fn default_true() -> bool { true }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            threshold: default_threshold(),
            normalize: default_true(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BlurConfig {
    #[serde(default = "default_kernel_size")]
    pub kernel_size: u32,
    #[serde(default = "default_sigma")]
    pub sigma: f32,
}

fn default_kernel_size() -> u32 { 99 }
fn default_sigma() -> f32 { 30.0 }

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            kernel_size: default_kernel_size(),
            sigma: default_sigma(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_whitelist_dir")]
    pub whitelist_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Where relative model paths are resolved. Falls back to the per-user
    /// model cache when unset.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
}

fn default_whitelist_dir() -> PathBuf { PathBuf::from("whitelist") }
fn default_output_dir() -> PathBuf { PathBuf::from("output") }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            whitelist_dir: default_whitelist_dir(),
            output_dir: default_output_dir(),
            models_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
    #[serde(default)]
    pub use_gpu: bool,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            optimization_level: default_optimization_level(),
            use_gpu: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Loads the TOML file (defaults when it does not exist), then applies
    /// `FACE_BLUR_*` environment overrides and validates the result.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml_str(&contents)?
        } else {
            tracing::info!("Config file {} not found, using defaults", path.display());
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| FaceBlurError::Config(format!("Config parse error: {}", e)))
    }

    /// `lookup` is injected so overrides can be tested without touching the
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FACE_BLUR_THRESHOLD") {
            self.matching.threshold = parse_env("FACE_BLUR_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("FACE_BLUR_KERNEL_SIZE") {
            self.blur.kernel_size = parse_env("FACE_BLUR_KERNEL_SIZE", &value)?;
        }
        if let Some(value) = lookup("FACE_BLUR_SIGMA") {
            self.blur.sigma = parse_env("FACE_BLUR_SIGMA", &value)?;
        }
        if let Some(value) = lookup("FACE_BLUR_WHITELIST_DIR") {
            self.paths.whitelist_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("FACE_BLUR_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("FACE_BLUR_USE_GPU") {
            self.performance.use_gpu = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(FaceBlurError::Config(format!(
                        "FACE_BLUR_USE_GPU must be true or false, got '{}'", other
                    )))
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceBlurError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceBlurError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(FaceBlurError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.nms_iou) {
            return Err(FaceBlurError::Config(format!(
                "NMS IoU threshold must be between 0.0 and 1.0, got {}",
                self.detector.nms_iou
            )));
        }
        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceBlurError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.normalization_value <= 0.0 {
            return Err(FaceBlurError::Config(format!(
                "Recognizer normalization value must be positive, got {}",
                self.recognizer.normalization_value
            )));
        }
        if !(self.matching.threshold > 0.0) {
            return Err(FaceBlurError::Config(format!(
                "Matching threshold must be positive, got {}",
                self.matching.threshold
            )));
        }
        if self.blur.kernel_size < 3 || self.blur.kernel_size % 2 == 0 {
            return Err(FaceBlurError::Config(format!(
                "Blur kernel size must be an odd number >= 3, got {}",
                self.blur.kernel_size
            )));
        }
        if !(self.blur.sigma > 0.0) {
            return Err(FaceBlurError::Config(format!(
                "Blur sigma must be positive, got {}",
                self.blur.sigma
            )));
        }
        if self.performance.optimization_level > 3 {
            return Err(FaceBlurError::Config(format!(
                "Optimization level must be between 0 and 3, got {}",
                self.performance.optimization_level
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        FaceBlurError::Config(format!("Invalid value for {}: '{}'", key, value))
    })
}
