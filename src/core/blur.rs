use crate::core::detector::FaceBox;
use image::{imageops, RgbImage};
use imageproc::filter::gaussian_blur_f32;

#[derive(Debug, Clone, Copy)]
pub struct BlurSettings {
    pub kernel_size: u32,
    pub sigma: f32,
}

impl BlurSettings {
    /// Sigma actually applied: capped so that `3 * sigma` stays within the
    /// kernel radius.
    pub fn effective_sigma(&self) -> f32 {
        let radius = (self.kernel_size / 2).max(1) as f32;
        self.sigma.min(radius / 3.0).max(0.1)
    }
}

impl From<&crate::common::config::BlurConfig> for BlurSettings {
    fn from(config: &crate::common::config::BlurConfig) -> Self {
        Self {
            kernel_size: config.kernel_size,
            sigma: config.sigma,
        }
    }
}

/// Gaussian-blurs the face rectangle of `frame` in place. Returns `false`
/// when the box has no pixels inside the frame.
pub fn blur_region(frame: &mut RgbImage, face: &FaceBox, settings: &BlurSettings) -> bool {
    let Some((x, y, w, h)) = face.clamped_rect(frame.width(), frame.height()) else {
        return false;
    };

    let region = imageops::crop_imm(frame, x, y, w, h).to_image();
    let blurred = gaussian_blur_f32(&region, settings.effective_sigma());
    imageops::replace(frame, &blurred, x as i64, y as i64);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        })
    }

    fn variance(img: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> f32 {
        let values: Vec<f32> = (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .map(|(x, y)| img.get_pixel(x, y)[0] as f32)
            .collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
    }

    #[test]
    fn blurs_inside_and_leaves_outside_untouched() {
        let original = checkerboard(40);
        let mut frame = original.clone();
        let face = FaceBox { x1: 10.0, y1: 10.0, x2: 30.0, y2: 30.0, confidence: 1.0 };
        let settings = BlurSettings { kernel_size: 99, sigma: 30.0 };

        assert!(blur_region(&mut frame, &face, &settings));

        for (x, y, pixel) in frame.enumerate_pixels() {
            let inside = (10..30).contains(&x) && (10..30).contains(&y);
            if !inside {
                assert_eq!(pixel, original.get_pixel(x, y), "pixel ({}, {}) changed", x, y);
            }
        }
        assert!(variance(&frame, 12, 12, 28, 28) < variance(&original, 12, 12, 28, 28) / 4.0);
    }

    #[test]
    fn box_outside_frame_is_noop() {
        let original = checkerboard(16);
        let mut frame = original.clone();
        let face = FaceBox { x1: 20.0, y1: 20.0, x2: 40.0, y2: 40.0, confidence: 1.0 };
        assert!(!blur_region(&mut frame, &face, &BlurSettings { kernel_size: 9, sigma: 3.0 }));
        assert_eq!(frame, original);
    }

    #[test]
    fn sigma_is_capped_by_kernel() {
        let s = BlurSettings { kernel_size: 9, sigma: 30.0 };
        assert!((s.effective_sigma() - 4.0 / 3.0).abs() < 1e-6);
        let s = BlurSettings { kernel_size: 99, sigma: 5.0 };
        assert_eq!(s.effective_sigma(), 5.0);
    }
}
