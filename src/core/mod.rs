pub mod blur;
pub mod detector;
pub mod processor;
pub mod quality;
pub mod recognizer;
pub mod session;
pub mod whitelist;

pub use blur::{blur_region, BlurSettings};
pub use detector::{DetectFaces, FaceBox, FaceDetector};
pub use processor::{FaceBlurProcessor, FaceDecision, FrameReport, FrameStats};
pub use quality::QualityMetrics;
pub use recognizer::{cosine_similarity, euclidean_distance, EmbedFaces, Embedding, FaceRecognizer};
pub use session::cuda_available;
pub use whitelist::{AddOutcome, MatchResult, Whitelist, WhitelistEntry};
