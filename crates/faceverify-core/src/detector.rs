//! SCRFD face detector via ONNX Runtime.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS post-processing,
//! run on decoded RGB images.

use crate::types::BoundingBox;
use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download it from insightface into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    /// Fit a `width × height` image into the square detector input.
    fn fit(width: u32, height: u32) -> (Self, u32, u32) {
        let side = SCRFD_INPUT_SIZE as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let info = Self {
            scale,
            pad_x: (side - new_w as f32) / 2.0,
            pad_y: (side - new_h as f32) / 2.0,
        };
        (info, new_w, new_h)
    }

    /// Map a point from letterboxed detector space back to the source image.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self { session, stride_indices })
    }

    /// Detect faces in an RGB image, returning bounding boxes sorted by confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::EmptyImage);
        }
        let (input, letterbox) = preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                StrideOutputs { scores, bboxes, kps },
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let faces: Vec<BoundingBox> = nms(all_detections, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .map(|face| face.clamp_to(image.width(), image.height()))
            .filter(|face| face.width > 0.0 && face.height > 0.0)
            .collect();

        tracing::debug!(count = faces.len(), "SCRFD detections");
        Ok(faces)
    }
}

/// Letterbox an RGB image into a normalized NCHW float tensor.
///
/// Padding is left at zero, which is what `SCRFD_MEAN` normalizes to.
fn preprocess(image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
    let (letterbox, new_w, new_h) = LetterboxInfo::fit(image.width(), image.height());
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let pad_x = letterbox.pad_x.floor() as usize;
    let pad_y = letterbox.pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
        if tx >= SCRFD_INPUT_SIZE || ty >= SCRFD_INPUT_SIZE {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports either name their tensors "score_8", "bbox_16", "kps_32", ...
/// or use generic numeric names. Unrecognized names fall back to the standard
/// positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping"
            );
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Raw output slices of one stride level.
struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for a single stride level.
fn decode_stride(
    out: StrideOutputs<'_>,
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..num_anchors)
        .filter_map(|idx| {
            let score = out.scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                return None;
            }

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let anchor_x = (cell % grid_w) as f32 * s;
            let anchor_y = (cell / grid_w) as f32 * s;

            // Distances from the anchor to [left, top, right, bottom], in strides.
            let d = out.bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(anchor_x - d[0] * s, anchor_y - d[1] * s);
            let (x2, y2) = letterbox.unmap(anchor_x + d[2] * s, anchor_y + d[3] * s);

            let landmarks = out.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| {
                    letterbox.unmap(anchor_x + k[i * 2] * s, anchor_y + k[i * 2 + 1] * s)
                })
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Non-Maximum Suppression: keep the most confident of each overlapping group.
/// Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Compute Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter_area = inter_w * inter_h;
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 { inter_area / union_area } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let (letterbox, new_w, new_h) = LetterboxInfo::fit(320, 240);
        assert_eq!((new_w, new_h), (640, 480));
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 80.0);

        let (orig_x, orig_y) = (100.0f32, 50.0f32);
        let boxed_x = orig_x * letterbox.scale + letterbox.pad_x;
        let boxed_y = orig_y * letterbox.scale + letterbox.pad_y;
        let (rx, ry) = letterbox.unmap(boxed_x, boxed_y);
        assert!((rx - orig_x).abs() < 0.1, "x: {rx} vs {orig_x}");
        assert!((ry - orig_y).abs() < 0.1, "y: {ry} vs {orig_y}");
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let image = RgbImage::from_pixel(320, 160, Rgb([255, 255, 255]));
        let (tensor, letterbox) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE]);
        assert_eq!(letterbox.pad_y, 160.0);
        // Padding rows stay at the normalized mean.
        assert_eq!(tensor[[0, 0, 10, 10]], 0.0);
        // Image rows carry the normalized pixel value.
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 2, 320, 320]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_maps_to_source_space() {
        let stride = 32;
        let cells = (SCRFD_INPUT_SIZE / stride).pow(2) * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; cells];
        let mut bboxes = vec![0.0f32; cells * 4];
        let kps = vec![0.0f32; cells * 10];

        // Anchor 2 is cell 1: (x=32, y=0) in detector space.
        scores[2] = 0.9;
        bboxes[8..12].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);

        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_stride(
            StrideOutputs { scores: &scores, bboxes: &bboxes, kps: &kps },
            stride,
            &letterbox,
            0.5,
        );
        assert_eq!(dets.len(), 1);
        let face = &dets[0];
        assert!((face.x - 8.0).abs() < 1e-4);
        assert!((face.width - 16.0).abs() < 1e-4);
        assert!((face.height - 16.0).abs() < 1e-4);
        assert!(face.landmarks.is_some());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }
}
