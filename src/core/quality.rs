use crate::core::detector::FaceBox;
use image::RgbImage;

/// How usable an image is as a whitelist reference.
#[derive(Debug, Clone)]
pub struct QualityMetrics {
    pub detection_confidence: f32,
    pub face_size_ratio: f32,
    pub face_pixels: u32,
    pub brightness_score: f32,
    pub contrast_score: f32,
    pub overall_score: f32,
}

/// Faces narrower than this give poor embeddings.
const MIN_FACE_PIXELS: u32 = 64;

impl QualityMetrics {
    pub fn calculate(image: &RgbImage, face: &FaceBox) -> Self {
        let detection_confidence = face.confidence.clamp(0.0, 1.0);

        let image_area = (image.width() * image.height()).max(1) as f32;
        let face_size_ratio = (face.area() / image_area).min(1.0);
        let face_pixels = face.width().min(face.height()) as u32;
        let size_score = (face_pixels as f32 / (MIN_FACE_PIXELS * 2) as f32).min(1.0);

        let (brightness_score, contrast_score) = region_quality(image, face);

        let overall_score = detection_confidence * 0.3
            + size_score * 0.3
            + brightness_score * 0.2
            + contrast_score * 0.2;

        QualityMetrics {
            detection_confidence,
            face_size_ratio,
            face_pixels,
            brightness_score,
            contrast_score,
            overall_score,
        }
    }

    pub fn meets_minimum_requirements(&self, min_quality: f32) -> bool {
        self.overall_score >= min_quality
    }

    pub fn assessment(&self) -> String {
        let quality_level = if self.overall_score >= 0.8 {
            "Excellent"
        } else if self.overall_score >= 0.7 {
            "Good"
        } else if self.overall_score >= 0.6 {
            "Acceptable"
        } else if self.overall_score >= 0.5 {
            "Poor"
        } else {
            "Very Poor"
        };

        format!("Quality: {} (score: {:.2})", quality_level, self.overall_score)
    }

    pub fn improvement_suggestions(&self) -> Vec<String> {
        let mut suggestions = Vec::new();

        if self.detection_confidence < 0.7 {
            suggestions.push("Face detection is uncertain - use a clear, front-facing photo".to_string());
        }
        if self.face_pixels < MIN_FACE_PIXELS {
            suggestions.push(format!(
                "Face is only {}px wide - use a higher resolution photo",
                self.face_pixels
            ));
        }
        if self.brightness_score < 0.5 {
            suggestions.push("Photo is too dark or too bright".to_string());
        }
        if self.contrast_score < 0.5 {
            suggestions.push("Photo has low contrast - use better lighting".to_string());
        }

        suggestions
    }
}

fn region_quality(image: &RgbImage, face: &FaceBox) -> (f32, f32) {
    let Some((x0, y0, w, h)) = face.clamped_rect(image.width(), image.height()) else {
        return (0.5, 0.5);
    };

    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    let mut count = 0u64;

    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let p = image.get_pixel(x, y);
            // Rec. 601 luma
            let luma = (299 * p[0] as u64 + 587 * p[1] as u64 + 114 * p[2] as u64) / 1000;
            sum += luma;
            sum_sq += luma * luma;
            count += 1;
        }
    }

    let mean = sum as f32 / count as f32;
    let variance = (sum_sq as f32 / count as f32) - (mean * mean);
    let std_dev = variance.max(0.0).sqrt();

    let brightness_score = 1.0 - ((mean - 127.5).abs() / 127.5).min(1.0);
    let contrast_score = (std_dev / 64.0).min(1.0);

    (brightness_score, contrast_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn flat_dark_tiny_face_scores_poorly() {
        let img = RgbImage::from_pixel(200, 200, Rgb([5, 5, 5]));
        let face = FaceBox { x1: 0.0, y1: 0.0, x2: 20.0, y2: 20.0, confidence: 0.5 };
        let q = QualityMetrics::calculate(&img, &face);
        assert!(q.overall_score < 0.5);
        assert!(!q.meets_minimum_requirements(0.6));
        assert_eq!(q.improvement_suggestions().len(), 4);
    }

    #[test]
    fn large_contrasty_face_scores_well() {
        let img = RgbImage::from_fn(256, 256, |x, _| if x % 2 == 0 { Rgb([230, 230, 230]) } else { Rgb([25, 25, 25]) });
        let face = FaceBox { x1: 0.0, y1: 0.0, x2: 256.0, y2: 256.0, confidence: 0.98 };
        let q = QualityMetrics::calculate(&img, &face);
        assert!(q.overall_score >= 0.8, "{}", q.assessment());
        assert!(q.improvement_suggestions().is_empty());
    }
}
