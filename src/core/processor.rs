use crate::common::Result;
use crate::core::blur::{blur_region, BlurSettings};
use crate::core::detector::{DetectFaces, FaceBox};
use crate::core::recognizer::EmbedFaces;
use crate::core::whitelist::{MatchResult, Whitelist};
use image::RgbImage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub detected: usize,
    pub blurred: usize,
    pub whitelisted: usize,
}

impl std::ops::AddAssign for FrameStats {
    fn add_assign(&mut self, other: Self) {
        self.detected += other.detected;
        self.blurred += other.blurred;
        self.whitelisted += other.whitelisted;
    }
}

/// What happened to one detected face.
#[derive(Debug, Clone)]
pub struct FaceDecision {
    pub face: FaceBox,
    pub matched: Option<MatchResult>,
}

impl FaceDecision {
    pub fn is_blurred(&self) -> bool {
        self.matched.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub stats: FrameStats,
    pub faces: Vec<FaceDecision>,
}

/// Blurs every face in a frame that does not match the whitelist.
pub struct FaceBlurProcessor<D, E> {
    detector: D,
    recognizer: E,
    whitelist: Whitelist,
    blur: BlurSettings,
    min_confidence: f32,
}

impl<D: DetectFaces, E: EmbedFaces> FaceBlurProcessor<D, E> {
    pub fn new(detector: D, recognizer: E, whitelist: Whitelist, blur: BlurSettings, min_confidence: f32) -> Self {
        Self { detector, recognizer, whitelist, blur, min_confidence }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn recognizer(&self) -> &E {
        &self.recognizer
    }

    /// Detects faces, matches each against the whitelist and blurs the rest.
    ///
    /// All faces are matched before any blurring so overlapping boxes are
    /// embedded from the untouched frame. A face whose embedding fails is
    /// treated as unknown and blurred.
    pub fn detect_and_blur_faces(&self, frame: &mut RgbImage) -> Result<FrameReport> {
        let faces = self.detector.detect(frame)?;
        let mut report = FrameReport::default();

        for face in faces.into_iter().filter(|f| f.confidence >= self.min_confidence) {
            let matched = match self.recognizer.embed(frame, &face) {
                Ok(embedding) => self.whitelist.is_whitelisted(&embedding),
                Err(e) => {
                    tracing::debug!("Embedding failed, blurring face: {}", e);
                    None
                }
            };
            report.faces.push(FaceDecision { face, matched });
        }

        report.stats.detected = report.faces.len();
        for decision in &report.faces {
            if decision.is_blurred() {
                if blur_region(frame, &decision.face, &self.blur) {
                    report.stats.blurred += 1;
                }
            } else {
                report.stats.whitelisted += 1;
            }
        }

        Ok(report)
    }
}
