use crate::common::config::MatchingConfig;
use crate::common::{DistanceMetric, FaceBlurError, Result};
use crate::core::detector::{largest_face, DetectFaces, FaceBox};
use crate::core::quality::QualityMetrics;
use crate::core::recognizer::{cosine_similarity, crop_face, euclidean_distance, EmbedFaces, Embedding};
use crate::storage::{EmbeddingCache, FileStamp};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "gif"];

/// Whitelist photos scoring below this get a warning when added.
const MIN_REFERENCE_QUALITY: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub name: String,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub name: String,
    pub distance: f32,
}

/// Reference faces that must stay visible in the output.
#[derive(Debug, Clone)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
    metric: DistanceMetric,
    threshold: f32,
}

impl Whitelist {
    pub fn new(metric: DistanceMetric, threshold: f32) -> Self {
        Self { entries: Vec::new(), metric, threshold }
    }

    pub fn from_entries(entries: Vec<WhitelistEntry>, metric: DistanceMetric, threshold: f32) -> Self {
        Self { entries, metric, threshold }
    }

    /// Embeds every image in `dir`, reusing cached embeddings for unchanged
    /// files unless `rebuild` is set. Images that fail are skipped with a
    /// warning; a missing or empty directory gives an empty whitelist.
    pub fn load<D, E>(
        dir: &Path,
        detector: &D,
        recognizer: &E,
        matching: &MatchingConfig,
        rebuild: bool,
    ) -> Result<Self>
    where
        D: DetectFaces + ?Sized,
        E: EmbedFaces + ?Sized,
    {
        let mut whitelist = Self::new(matching.metric, matching.threshold);

        if !dir.exists() {
            tracing::warn!("Whitelist directory '{}' does not exist.", dir.display());
            return Ok(whitelist);
        }

        let images = list_images(dir)?;
        if images.is_empty() {
            tracing::warn!("Whitelist directory '{}' is empty.", dir.display());
            return Ok(whitelist);
        }

        let model_id = recognizer.model_id();
        let mut cache = if rebuild {
            EmbeddingCache::empty(dir, &model_id)
        } else {
            EmbeddingCache::load(dir, &model_id)
        };

        let mut names = Vec::with_capacity(images.len());
        for path in &images {
            let stamp = match FileStamp::of(path) {
                Ok(stamp) => stamp,
                Err(e) => {
                    tracing::warn!("Failed to process {}: {}", path.display(), e);
                    continue;
                }
            };
            names.push(stamp.name.clone());

            if let Some(embedding) = cache.lookup(&stamp) {
                tracing::debug!("Using cached embedding for {}", stamp.name);
                whitelist.entries.push(WhitelistEntry {
                    name: stamp.name.clone(),
                    embedding: embedding.clone(),
                });
                continue;
            }

            let embedding = image::open(path)
                .map_err(FaceBlurError::from)
                .and_then(|img| embed_reference_image(&img.to_rgb8(), detector, recognizer));

            match embedding {
                Ok(embedding) => {
                    tracing::info!("Successfully processed {}", stamp.name);
                    whitelist.entries.push(WhitelistEntry {
                        name: stamp.name.clone(),
                        embedding: embedding.clone(),
                    });
                    cache.insert(stamp, embedding);
                }
                Err(e) => tracing::warn!("Failed to process {}: {}", stamp.name, e),
            }
        }

        cache.retain_names(&names);
        if let Err(e) = cache.save() {
            tracing::warn!("Could not write embedding cache: {}", e);
        }

        tracing::info!("Loaded {} face embeddings from whitelist.", whitelist.len());
        Ok(whitelist)
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => {
                if a.len() != b.len() || a.is_empty() {
                    f32::INFINITY
                } else {
                    1.0 - cosine_similarity(a, b)
                }
            }
        }
    }

    /// Closest whitelist entry regardless of the threshold.
    pub fn best_match(&self, embedding: &[f32]) -> Option<MatchResult> {
        self.entries
            .iter()
            .map(|entry| MatchResult {
                name: entry.name.clone(),
                distance: self.distance(embedding, &entry.embedding),
            })
            .filter(|m| m.distance.is_finite())
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// The closest entry when it is strictly under the threshold.
    pub fn is_whitelisted(&self, embedding: &[f32]) -> Option<MatchResult> {
        self.best_match(embedding)
            .filter(|m| m.distance < self.threshold)
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files in `dir`, sorted by name. A missing directory has none.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Embeds the largest face of a reference image, or the whole image when it
/// is already a tight crop and nothing is detected.
pub fn embed_reference_image<D, E>(image: &RgbImage, detector: &D, recognizer: &E) -> Result<Embedding>
where
    D: DetectFaces + ?Sized,
    E: EmbedFaces + ?Sized,
{
    let faces = detector.detect(image)?;
    let face = largest_face(&faces)
        .cloned()
        .unwrap_or_else(|| FaceBox::full_image(image.width(), image.height()));
    recognizer.embed(image, &face)
}

#[derive(Debug)]
pub enum AddOutcome {
    /// The largest detected face was cropped and saved.
    Cropped { path: PathBuf, quality: QualityMetrics },
    /// No face was found; the original file was copied.
    Copied { path: PathBuf },
}

impl AddOutcome {
    pub fn path(&self) -> &Path {
        match self {
            AddOutcome::Cropped { path, .. } | AddOutcome::Copied { path } => path,
        }
    }
}

/// Adds a face image to the whitelist directory, cropped to the largest face
/// when one is found.
pub fn add_to_whitelist<D>(image_path: &Path, dir: &Path, detector: &D) -> Result<AddOutcome>
where
    D: DetectFaces + ?Sized,
{
    if !is_image_file(image_path) {
        return Err(FaceBlurError::Whitelist(format!(
            "{} is not a supported image ({})",
            image_path.display(),
            IMAGE_EXTENSIONS.join(", ")
        )));
    }

    fs::create_dir_all(dir)?;
    let base = image_path
        .file_name()
        .ok_or_else(|| FaceBlurError::Whitelist(format!("Invalid path: {}", image_path.display())))?;
    let dest = dir.join(base);

    let image = image::open(image_path)?.to_rgb8();
    let faces = detector.detect(&image)?;

    if let Some(face) = largest_face(&faces) {
        if let Some(cropped) = crop_face(&image, face) {
            let quality = QualityMetrics::calculate(&image, face);
            if !quality.meets_minimum_requirements(MIN_REFERENCE_QUALITY) {
                tracing::warn!("{}: {}", base.to_string_lossy(), quality.assessment());
                for suggestion in quality.improvement_suggestions() {
                    tracing::warn!("  - {}", suggestion);
                }
            }
            cropped.save(&dest)?;
            tracing::info!("Added cropped face from {} to whitelist.", base.to_string_lossy());
            return Ok(AddOutcome::Cropped { path: dest, quality });
        }
    }

    if same_file(image_path, &dest) {
        tracing::info!("{} is already in the whitelist.", base.to_string_lossy());
        return Ok(AddOutcome::Copied { path: dest });
    }
    fs::copy(image_path, &dest)?;
    tracing::info!("Added {} to whitelist (original image).", base.to_string_lossy());
    Ok(AddOutcome::Copied { path: dest })
}

// fs::copy onto itself truncates the file
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Deletes a whitelist image and its cached embedding.
pub fn remove_from_whitelist(dir: &Path, name: &str, model_id: &str) -> Result<()> {
    let path = dir.join(name);
    if Path::new(name).components().count() != 1 || !path.is_file() {
        return Err(FaceBlurError::Whitelist(format!("No whitelist image named '{}'", name)));
    }
    fs::remove_file(&path)?;

    let mut cache = EmbeddingCache::load(dir, model_id);
    if cache.remove(name) {
        cache.save()?;
    }
    Ok(())
}
