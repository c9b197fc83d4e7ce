//! Engine report to API response.

use std::collections::BTreeMap;

use faceverify_core::EngineReport;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Face region in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

/// Body of a successful `POST /api/verify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub match_percentage: f64,
    pub model_used: String,
    pub facial_areas: BTreeMap<String, FaceRegion>,
}

/// `(1 - distance) * 100` rounded to two decimals. Not clamped: distances
/// above 1 give negative percentages.
pub fn match_percentage(distance: Option<f64>) -> f64 {
    let distance = distance.unwrap_or(1.0);
    ((1.0 - distance) * 100.0 * 100.0).round() / 100.0
}

pub fn translate(report: &EngineReport, model_used: &str) -> VerificationResult {
    let facial_areas = report
        .facial_areas
        .iter()
        .filter_map(|(key, value)| match face_region(value) {
            Some(region) => Some((key.clone(), region)),
            None => {
                tracing::debug!(image = %key, "dropping malformed facial area");
                None
            }
        })
        .collect();

    VerificationResult {
        verified: report.verified.unwrap_or(false),
        match_percentage: match_percentage(report.distance),
        model_used: model_used.to_string(),
        facial_areas,
    }
}

fn face_region(value: &Value) -> Option<FaceRegion> {
    let area = value.as_object()?;
    let field = |key: &str| area.get(key).and_then(coerce_int);
    Some(FaceRegion {
        x: field("x")?,
        y: field("y")?,
        w: field("w")?,
        h: field("h")?,
    })
}

/// Integer view of a loosely typed coordinate. Floats truncate toward zero.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
