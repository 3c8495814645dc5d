use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceBlurError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Video error: {0}")]
    Video(String),

    #[error("Whitelist error: {0}")]
    Whitelist(String),

    #[error("Whitelist is empty. Add faces to the whitelist first.")]
    EmptyWhitelist,

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Required tool not found on PATH: {0}")]
    ToolMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceBlurError>;
