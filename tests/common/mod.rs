//! Model-free stand-ins for the detector and recognizer.
#![allow(dead_code)]

use face_blur::core::detector::FaceBox;
use face_blur::core::recognizer::{crop_face, l2_normalize, Embedding};
use face_blur::{DetectFaces, EmbedFaces, FaceBlurError, Result};
use image::{Rgb, RgbImage};
use std::cell::Cell;

/// Returns the same boxes for every image, optionally failing on chosen calls.
pub struct FakeDetector {
    pub faces: Vec<FaceBox>,
    pub fail_on_call: Option<usize>,
    calls: Cell<usize>,
}

impl FakeDetector {
    pub fn new(faces: Vec<FaceBox>) -> Self {
        Self { faces, fail_on_call: None, calls: Cell::new(0) }
    }

    pub fn failing_on(faces: Vec<FaceBox>, call: usize) -> Self {
        Self { faces, fail_on_call: Some(call), calls: Cell::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl DetectFaces for FakeDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<FaceBox>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_on_call == Some(call) {
            return Err(FaceBlurError::Model("detector exploded".into()));
        }
        Ok(self.faces.clone())
    }
}

/// Embeds a face as its L2-normalised mean colour.
#[derive(Default)]
pub struct MeanColorEmbedder {
    calls: Cell<usize>,
}

impl MeanColorEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl EmbedFaces for MeanColorEmbedder {
    fn embed(&self, image: &RgbImage, face: &FaceBox) -> Result<Embedding> {
        self.calls.set(self.calls.get() + 1);
        let crop = crop_face(image, face).ok_or(FaceBlurError::NoFaceDetected)?;
        let n = (crop.width() * crop.height()) as f32;

        let mut sum = [0.0f32; 3];
        for pixel in crop.pixels() {
            for c in 0..3 {
                sum[c] += pixel[c] as f32;
            }
        }
        let mut embedding: Embedding = sum.iter().map(|s| s / n).collect();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn model_id(&self) -> String {
        "mean-color".to_string()
    }
}

pub fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> FaceBox {
    FaceBox { x1, y1, x2, y2, confidence: 0.95 }
}

/// Image whose colour alternates between `a` and `b` in a pixel checkerboard.
pub fn checker(width: u32, height: u32, a: Rgb<u8>, b: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| if (x + y) % 2 == 0 { a } else { b })
}

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const DARK_RED: Rgb<u8> = Rgb([128, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const DARK_BLUE: Rgb<u8> = Rgb([0, 0, 128]);

/// 64x32 frame: a red face on the left half and a blue face on the right.
pub fn two_face_frame() -> RgbImage {
    RgbImage::from_fn(64, 32, |x, y| {
        let even = (x + y) % 2 == 0;
        match (x < 32, even) {
            (true, true) => RED,
            (true, false) => DARK_RED,
            (false, true) => BLUE,
            (false, false) => DARK_BLUE,
        }
    })
}

pub fn left_face() -> FaceBox {
    face(4.0, 4.0, 28.0, 28.0)
}

pub fn right_face() -> FaceBox {
    face(36.0, 4.0, 60.0, 28.0)
}

/// Red direction, i.e. what `MeanColorEmbedder` produces for the left face.
pub fn red_embedding() -> Embedding {
    vec![1.0, 0.0, 0.0]
}
