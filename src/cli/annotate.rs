use crate::core::detector::FaceBox;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const HIGH_CONF_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MED_CONF_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LOW_CONF_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

fn confidence_color(confidence: f32) -> Rgb<u8> {
    if confidence > 0.9 {
        HIGH_CONF_COLOR
    } else if confidence > 0.7 {
        MED_CONF_COLOR
    } else {
        LOW_CONF_COLOR
    }
}

/// Copy of `image` with a box around each detection, coloured by confidence.
pub fn annotate_detections(image: &RgbImage, faces: &[FaceBox]) -> RgbImage {
    let mut img = image.clone();

    for face in faces {
        let Some((x, y, w, h)) = face.clamped_rect(img.width(), img.height()) else {
            continue;
        };
        let color = confidence_color(face.confidence);

        draw_hollow_rect_mut(&mut img, Rect::at(x as i32, y as i32).of_size(w, h), color);
        // Second ring for visibility on large frames
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(&mut img, Rect::at(x as i32 + 1, y as i32 + 1).of_size(w - 2, h - 2), color);
        }
    }

    img
}

/// `<dir>/<stem>_detections.png`
pub fn annotated_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output_dir.join(format!("{}_detections.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_only_the_outline() {
        let image = RgbImage::new(20, 20);
        let face = FaceBox { x1: 5.0, y1: 5.0, x2: 15.0, y2: 15.0, confidence: 0.95 };
        let out = annotate_detections(&image, &[face]);

        assert_eq!(*out.get_pixel(5, 5), HIGH_CONF_COLOR);
        assert_eq!(*out.get_pixel(6, 6), HIGH_CONF_COLOR);
        assert_eq!(*out.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn colour_tracks_confidence() {
        assert_eq!(confidence_color(0.95), HIGH_CONF_COLOR);
        assert_eq!(confidence_color(0.8), MED_CONF_COLOR);
        assert_eq!(confidence_color(0.3), LOW_CONF_COLOR);
    }

    #[test]
    fn annotated_path_uses_stem() {
        let path = annotated_path(Path::new("out"), Path::new("/tmp/group.jpg"));
        assert_eq!(path, Path::new("out/group_detections.png"));
    }
}
