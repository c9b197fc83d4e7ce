use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box covering a whole image, used when no face was detected and
    /// detection is not enforced.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            confidence: 0.0,
            landmarks: None,
        }
    }

    /// Clip the box to the image bounds.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x1 = self.x.clamp(0.0, width as f32);
        let y1 = self.y.clamp(0.0, height as f32);
        let x2 = (self.x + self.width).clamp(0.0, width as f32);
        let y2 = (self.y + self.height).clamp(0.0, height as f32);
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: self.confidence,
            landmarks: self.landmarks,
        }
    }

    /// Region record in the engine report layout: integer `x`, `y`, `w`, `h`
    /// plus detection confidence and eye positions when known.
    pub fn to_facial_area(&self) -> serde_json::Value {
        let eye = |idx: usize| {
            self.landmarks
                .map(|lms| {
                    let (x, y) = lms[idx];
                    serde_json::json!([x.round() as i64, y.round() as i64])
                })
                .unwrap_or(serde_json::Value::Null)
        };
        serde_json::json!({
            "x": self.x.round() as i64,
            "y": self.y.round() as i64,
            "w": self.width.round() as i64,
            "h": self.height.round() as i64,
            "confidence": self.confidence,
            "left_eye": eye(0),
            "right_eye": eye(1),
        })
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance, `1 - similarity`, in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Per-deployment parameters of a comparison call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Name of the comparison model. Only "ArcFace" is available.
    pub model: String,
    /// Name of the face detector. Only "scrfd" is available.
    pub detector_backend: String,
    /// When false, an image without a detectable face is compared as a whole
    /// instead of failing the call.
    pub enforce_detection: bool,
    /// Maximum cosine distance still reported as the same person.
    pub distance_threshold: f32,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            model: "ArcFace".to_string(),
            detector_backend: "scrfd".to_string(),
            enforce_detection: false,
            distance_threshold: 0.68,
        }
    }
}

/// Raw comparison report.
///
/// Deliberately loose: fields may be absent and `facial_areas` entries are
/// arbitrary JSON, so consumers must validate what they use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineReport {
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub detector_backend: Option<String>,
    #[serde(default)]
    pub similarity_metric: Option<String>,
    /// Detected region per image label ("img1", "img2").
    #[serde(default)]
    pub facial_areas: BTreeMap<String, serde_json::Value>,
}
