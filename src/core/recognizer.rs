use crate::common::{Config, FaceBlurError, Result, Workspace};
use crate::core::detector::FaceBox;
use crate::core::session::build_session;
use image::{imageops::{self, FilterType}, RgbImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use std::sync::Arc;

pub type Embedding = Vec<f32>;

/// Face embedding seam used by the whitelist and the frame processor.
pub trait EmbedFaces {
    fn embed(&self, image: &RgbImage, face: &FaceBox) -> Result<Embedding>;

    /// Identifies the model so cached embeddings from another model are not
    /// reused.
    fn model_id(&self) -> String;
}

pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
    model_id: String,
}

impl FaceRecognizer {
    pub fn new(config: &Config, workspace: &Workspace) -> Result<Self> {
        let model_path = workspace.resolve_model(&config.models.recognizer_path);
        let (session, environment) = build_session("face_recognizer", &model_path, config)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
            model_id: model_id_for(config, workspace),
        })
    }

    fn preprocess_face(&self, img: &RgbImage) -> Array4<f32> {
        let size = self.config.recognizer.input_size as usize;
        let norm_val = self.config.recognizer.normalization_value;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                array[[0, c, y, x]] = (pixel[c] as f32 - norm_val) / norm_val;
            }
        }

        array
    }
}

impl EmbedFaces for FaceRecognizer {
    fn embed(&self, image: &RgbImage, face: &FaceBox) -> Result<Embedding> {
        let face_img = crop_face(image, face).ok_or(FaceBlurError::NoFaceDetected)?;

        let size = self.config.recognizer.input_size;
        let resized = imageops::resize(&face_img, size, size, FilterType::Triangle);

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let output = outputs
            .first()
            .ok_or_else(|| FaceBlurError::Model("Recognizer produced no outputs".into()))?
            .try_extract::<f32>()?;
        let mut embedding: Embedding = output.view().iter().copied().collect();

        if self.config.matching.normalize {
            l2_normalize(&mut embedding);
        }
        Ok(embedding)
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }
}

/// Cache key for embeddings produced with this config: the resolved model
/// path plus whether outputs are L2-normalised.
pub fn model_id_for(config: &Config, workspace: &Workspace) -> String {
    let model_path = workspace.resolve_model(&config.models.recognizer_path);
    let norm = if config.matching.normalize { "l2" } else { "raw" };
    format!("{}#{}", model_path.display(), norm)
}

/// Copies the face region out of `image`, clipped to its bounds.
pub fn crop_face(image: &RgbImage, face: &FaceBox) -> Option<RgbImage> {
    let (x, y, w, h) = face.clamped_rect(image.width(), image.height())?;
    Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn l2_norm(embedding: &[f32]) -> f32 {
    embedding.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn l2_normalize(embedding: &mut [f32]) {
    let norm = l2_norm(embedding);
    if norm > 0.0 {
        for value in embedding.iter_mut() {
            *value /= norm;
        }
    }
}

pub fn average_embeddings(embeddings: &[Embedding]) -> Embedding {
    let Some(first) = embeddings.first() else {
        return vec![];
    };

    let mut averaged = vec![0.0f32; first.len()];
    for embedding in embeddings {
        for (i, &value) in embedding.iter().enumerate().take(averaged.len()) {
            averaged[i] += value;
        }
    }

    let count = embeddings.len() as f32;
    for value in &mut averaged {
        *value /= count;
    }

    averaged
}
