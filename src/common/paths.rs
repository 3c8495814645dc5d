use std::path::{Path, PathBuf};
use std::fs;
use directories::ProjectDirs;
use crate::common::config::Config;
use crate::common::error::{FaceBlurError, Result};

const DEV_BASE_DIR: &str = "./dev_data";

/// Resolves the directories the tool reads from and writes to.
///
/// In dev mode everything lives under `./dev_data` so experiments never touch
/// the real whitelist or the shared model cache.
#[derive(Debug, Clone)]
pub struct Workspace {
    dev: bool,
    whitelist_dir: PathBuf,
    output_dir: PathBuf,
    models_dir: PathBuf,
}

impl Workspace {
    pub fn new(config: &Config, dev: bool) -> Result<Self> {
        if dev {
            let base = PathBuf::from(DEV_BASE_DIR);
            return Ok(Self {
                dev,
                whitelist_dir: base.join("whitelist"),
                output_dir: base.join("output"),
                models_dir: config
                    .paths
                    .models_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("./models")),
            });
        }

        let models_dir = match &config.paths.models_dir {
            Some(dir) => dir.clone(),
            None => default_models_dir()?,
        };

        Ok(Self {
            dev,
            whitelist_dir: config.paths.whitelist_dir.clone(),
            output_dir: config.paths.output_dir.clone(),
            models_dir,
        })
    }

    pub fn with_dirs(whitelist_dir: PathBuf, output_dir: PathBuf, models_dir: PathBuf) -> Self {
        Self { dev: false, whitelist_dir, output_dir, models_dir }
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn whitelist_dir(&self) -> &Path {
        &self.whitelist_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.whitelist_dir)?;
        fs::create_dir_all(&self.output_dir)?;
        if self.dev {
            tracing::debug!("Dev workspace under {}", DEV_BASE_DIR);
        }
        Ok(())
    }

    /// Model paths in the config may be relative to the models directory.
    pub fn resolve_model(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.models_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }

    pub fn default_output_path(&self, input: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        output_file_name(&self.output_dir, input, &timestamp)
    }
}

fn default_models_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "faceblur", "FaceBlur")
        .ok_or_else(|| FaceBlurError::Config("Failed to get project dirs".into()))?;
    Ok(dirs.cache_dir().join("models"))
}

/// `<output_dir>/<stem>_blurred_<timestamp>.<ext>`, keeping `mp4`/`avi` and
/// falling back to `avi` for every other container.
pub fn output_file_name(output_dir: &Path, input: &Path, timestamp: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let ext = match input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "mp4",
        _ => "avi",
    };
    output_dir.join(format!("{}_blurred_{}.{}", stem, timestamp, ext))
}
