use crate::common::{Config, FaceBlurError, Result, Workspace};
use crate::core::session::build_session;
use image::{imageops::{self, FilterType}, RgbImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Integer pixel rectangle `(x, y, w, h)` clipped to a `width` x `height`
    /// frame, or `None` when nothing of the box is inside the frame.
    pub fn clamped_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0).floor() as u32;
        let y1 = self.y1.max(0.0).floor() as u32;
        let x2 = (self.x2.max(0.0).ceil() as u32).min(width);
        let y2 = (self.y2.max(0.0).ceil() as u32).min(height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }

    /// Box covering a whole image, used when a whitelist image is already a
    /// face crop.
    pub fn full_image(width: u32, height: u32) -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            x2: width as f32,
            y2: height as f32,
            confidence: 1.0,
        }
    }
}

/// Face detection seam used by the whitelist and the frame processor.
pub trait DetectFaces {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>>;
}

pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl FaceDetector {
    pub fn new(config: &Config, workspace: &Workspace) -> Result<Self> {
        let model_path = workspace.resolve_model(&config.models.detector_path);
        let (session, environment) = build_session("face_detector", &model_path, config)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn image_to_array(&self, img: &RgbImage) -> Array4<f32> {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));
        let norm_factor = 1.0 / 255.0;

        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }
}

impl DetectFaces for FaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;
        let input_width = self.config.detector.input_width;
        let input_height = self.config.detector.input_height;

        let img_array = if image.width() == input_width && image.height() == input_height {
            self.image_to_array(image)
        } else {
            let resized = imageops::resize(image, input_width, input_height, FilterType::Triangle);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let output = outputs
            .first()
            .ok_or_else(|| FaceBlurError::Model("Detector produced no outputs".into()))?
            .try_extract::<f32>()?;
        let view = output.view();
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let mut faces = parse_predictions(&data, &shape, input_width as f32, input_height as f32);

        // NMS first on the low-threshold boxes, then the real confidence cut
        faces = nms(faces, self.config.detector.nms_iou);
        faces.retain(|face| face.confidence >= self.config.detector.confidence);
        faces.truncate(self.config.detector.max_faces);

        let scale_x = orig_width / input_width as f32;
        let scale_y = orig_height / input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        tracing::trace!("Detected {} face(s)", faces.len());
        Ok(faces)
    }
}

/// Decodes YOLO-style predictions, either `[1, N, 5+]` or transposed
/// `[1, 5+, N]`, into corner boxes in model input coordinates.
pub fn parse_predictions(data: &[f32], shape: &[usize], input_width: f32, input_height: f32) -> Vec<FaceBox> {
    let mut faces = Vec::new();

    let (num_predictions, prediction_length, is_transposed) = match shape.len() {
        n if n >= 3 => {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        }
        2 => (shape[0], shape[1], false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return faces;
        }
    };

    if prediction_length < 4 || data.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return faces;
    }

    let at = |i: usize, field: usize| -> f32 {
        if is_transposed {
            data[field * num_predictions + i]
        } else {
            data[i * prediction_length + field]
        }
    };

    for i in 0..num_predictions {
        let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
        // Very low threshold, only drops empty anchors
        if confidence <= 0.001 {
            continue;
        }

        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        let normalized = cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0;
        let (sx, sy) = if normalized { (input_width, input_height) } else { (1.0, 1.0) };

        let (cx, cy, w, h) = (cx * sx, cy * sy, w * sx, h * sy);
        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_width);
        let y2 = (cy + h / 2.0).min(input_height);

        if x2 - x1 > 2.0 && y2 - y1 > 2.0 {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    faces
}

/// Greedy non-maximum suppression. The result is sorted by confidence,
/// highest first.
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = box1.area() + box2.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

pub fn largest_face(faces: &[FaceBox]) -> Option<&FaceBox> {
    faces.iter().max_by(|a, b| a.area().total_cmp(&b.area()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(20.0, 20.0, 30.0, 30.0, 0.9);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_drops_overlapping_lower_confidence() {
        let boxes = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.6),
            face(1.0, 1.0, 11.0, 11.0, 0.95),
            face(50.0, 50.0, 60.0, 60.0, 0.7),
        ];
        let kept = nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn largest_face_picks_biggest_area() {
        let faces = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.99),
            face(0.0, 0.0, 40.0, 30.0, 0.5),
        ];
        assert_eq!(largest_face(&faces).unwrap().confidence, 0.5);
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn clamped_rect_clips_to_frame() {
        let f = face(-5.0, 10.0, 50.0, 200.0, 0.9);
        assert_eq!(f.clamped_rect(40, 100), Some((0, 10, 40, 90)));
        let outside = face(100.0, 100.0, 120.0, 120.0, 0.9);
        assert_eq!(outside.clamped_rect(50, 50), None);
    }

    #[test]
    fn parses_standard_layout_in_pixels() {
        // [1, 6, 5]: one real face, the rest empty anchors
        let mut data = vec![100.0, 100.0, 40.0, 60.0, 0.92];
        data.extend(std::iter::repeat(0.0).take(25));
        let faces = parse_predictions(&data, &[1, 6, 5], 640.0, 640.0);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0], face(80.0, 70.0, 120.0, 130.0, 0.92));
    }

    #[test]
    fn parses_transposed_normalized_layout() {
        // [1, 5, 6] with normalised coordinates
        let data = vec![
            0.5, 0.1, 0.9, 0.0, 0.0, 0.0, // cx
            0.5, 0.1, 0.9, 0.0, 0.0, 0.0, // cy
            0.25, 0.0, 0.1, 0.0, 0.0, 0.0, // w
            0.25, 0.0, 0.1, 0.0, 0.0, 0.0, // h
            0.8, 0.0, 0.3, 0.0, 0.0, 0.0, // conf
        ];
        let faces = parse_predictions(&data, &[1, 5, 6], 100.0, 100.0);
        assert_eq!(faces.len(), 2);
        assert!((faces[0].x1 - 37.5).abs() < 1e-4);
        assert!((faces[0].x2 - 62.5).abs() < 1e-4);
        assert_eq!(faces[1].confidence, 0.3);
    }

    #[test]
    fn unexpected_shape_yields_nothing() {
        assert!(parse_predictions(&[1.0, 2.0], &[2], 10.0, 10.0).is_empty());
    }
}
