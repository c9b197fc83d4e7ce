//! Pairwise face comparison.
//!
//! [`FaceComparer`] is the capability the daemon consumes: two image paths
//! in, one loosely typed [`EngineReport`] out. [`OnnxComparer`] implements it
//! with the SCRFD detector and the ArcFace recognizer.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{imageops, ImageReader, RgbImage};
use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, CompareOptions, Embedding, EngineReport};
use crate::{ARCFACE_MODEL_FILE, SCRFD_MODEL_FILE};

const MODEL_NAME: &str = "ArcFace";
const DETECTOR_BACKEND: &str = "scrfd";
const SIMILARITY_METRIC: &str = "cosine";

#[derive(Error, Debug)]
pub enum CompareError {
    #[error(
        "Face could not be detected in {0}. Please confirm that the picture is a face photo \
         or consider to set enforce_detection param to False."
    )]
    FaceNotDetected(String),
    #[error("failed to open image {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("unsupported model: {0} (available: ArcFace)")]
    UnsupportedModel(String),
    #[error("unsupported detector backend: {0} (available: scrfd)")]
    UnsupportedDetector(String),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("model session poisoned by an earlier panic")]
    Poisoned,
}

/// Compares the faces found in two image files.
///
/// Implementations are shared by every worker thread, so `compare` must be
/// safe to call concurrently.
pub trait FaceComparer: Send + Sync {
    fn compare(
        &self,
        img1: &Path,
        img2: &Path,
        options: &CompareOptions,
    ) -> Result<EngineReport, CompareError>;
}

/// Loaded inference sessions. Each session needs exclusive access while it runs.
struct Models {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

/// SCRFD + ArcFace comparer.
///
/// Nothing is loaded at construction: the first `compare` call loads both
/// models and keeps them for the lifetime of the comparer. A failed load is
/// retried on the next call.
pub struct OnnxComparer {
    model_dir: PathBuf,
    models: OnceCell<Models>,
}

impl OnnxComparer {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            models: OnceCell::new(),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(ARCFACE_MODEL_FILE)
    }

    pub fn is_loaded(&self) -> bool {
        self.models.get().is_some()
    }

    fn models(&self) -> Result<&Models, CompareError> {
        self.models.get_or_try_init(|| {
            let detector = FaceDetector::load(&self.scrfd_model_path().to_string_lossy())?;
            tracing::info!(dir = %self.model_dir.display(), "SCRFD detector loaded");
            let recognizer = FaceRecognizer::load(&self.arcface_model_path().to_string_lossy())?;
            tracing::info!(dir = %self.model_dir.display(), "ArcFace recognizer loaded");
            Ok(Models {
                detector: Mutex::new(detector),
                recognizer: Mutex::new(recognizer),
            })
        })
    }

    /// Decode one image, locate its face and extract the embedding.
    fn represent(
        &self,
        models: &Models,
        path: &Path,
        enforce_detection: bool,
    ) -> Result<(Embedding, BoundingBox), CompareError> {
        let image = load_rgb(path)?;
        let best = {
            let mut detector = models.detector.lock().map_err(|_| CompareError::Poisoned)?;
            detector.detect(&image)?.into_iter().next()
        };
        if best.is_none() {
            tracing::debug!(path = %path.display(), enforce_detection, "no face detected");
        }

        let (crop, region) = face_crop(&image, best, enforce_detection, path)?;
        let embedding = models
            .recognizer
            .lock()
            .map_err(|_| CompareError::Poisoned)?
            .extract(&crop)?;
        Ok((embedding, region))
    }
}

impl FaceComparer for OnnxComparer {
    fn compare(
        &self,
        img1: &Path,
        img2: &Path,
        options: &CompareOptions,
    ) -> Result<EngineReport, CompareError> {
        check_options(options)?;
        let models = self.models()?;

        let (emb1, area1) = self.represent(models, img1, options.enforce_detection)?;
        let (emb2, area2) = self.represent(models, img2, options.enforce_detection)?;

        let distance = emb1.cosine_distance(&emb2) as f64;
        let threshold = options.distance_threshold as f64;
        tracing::debug!(distance, threshold, "comparison finished");

        Ok(EngineReport {
            verified: Some(distance <= threshold),
            distance: Some(distance),
            threshold: Some(threshold),
            model: Some(MODEL_NAME.to_string()),
            detector_backend: Some(options.detector_backend.clone()),
            similarity_metric: Some(SIMILARITY_METRIC.to_string()),
            facial_areas: [
                ("img1".to_string(), area1.to_facial_area()),
                ("img2".to_string(), area2.to_facial_area()),
            ]
            .into_iter()
            .collect(),
        })
    }
}

fn check_options(options: &CompareOptions) -> Result<(), CompareError> {
    if !options.model.eq_ignore_ascii_case(MODEL_NAME) {
        return Err(CompareError::UnsupportedModel(options.model.clone()));
    }
    if !options.detector_backend.eq_ignore_ascii_case(DETECTOR_BACKEND) {
        return Err(CompareError::UnsupportedDetector(options.detector_backend.clone()));
    }
    Ok(())
}

/// Decode an image file by content, not by extension.
fn load_rgb(path: &Path) -> Result<RgbImage, CompareError> {
    let io_err = |source| CompareError::Io {
        path: path.display().to_string(),
        source,
    };
    let image = ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)?
        .decode()
        .map_err(|source| CompareError::Decode {
            path: path.display().to_string(),
            source,
        })?;
    Ok(image.to_rgb8())
}

/// Produce the 112×112 recognizer input and the region to report.
///
/// A detected face with landmarks is aligned; one without landmarks is
/// cropped and resized. Without a face the whole image stands in, unless
/// detection is enforced.
fn face_crop(
    image: &RgbImage,
    face: Option<BoundingBox>,
    enforce_detection: bool,
    path: &Path,
) -> Result<(RgbImage, BoundingBox), CompareError> {
    match face {
        Some(face) => {
            let crop = match &face.landmarks {
                Some(landmarks) => alignment::align_face(image, landmarks),
                None => {
                    let region = imageops::crop_imm(
                        image,
                        face.x as u32,
                        face.y as u32,
                        (face.width as u32).max(1),
                        (face.height as u32).max(1),
                    )
                    .to_image();
                    alignment::resize_face(&region)
                }
            };
            Ok((crop, face))
        }
        None if enforce_detection => Err(CompareError::FaceNotDetected(path.display().to_string())),
        None => Ok((
            alignment::resize_face(image),
            BoundingBox::full_frame(image.width(), image.height()),
        )),
    }
}
