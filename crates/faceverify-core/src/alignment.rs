//! Face alignment via 4-DOF similarity transform.
//!
//! Warps detected faces in an RGB image to the canonical 112×112 ArcFace
//! position using the five InsightFace reference landmarks.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [[a, -b], [b, a]] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit from `src` landmarks to `dst` landmarks.
    ///
    /// Each point pair contributes two equations in the unknowns [a, b, tx, ty]:
    /// `sx*a - sy*b + tx = dx` and `sy*a + sx*b + ty = dy`. The normal
    /// equations are accumulated and solved directly.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mut normal = [[0.0f32; 5]; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            for (row, rhs) in [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)] {
                for j in 0..4 {
                    for k in 0..4 {
                        normal[j][k] += row[j] * row[k];
                    }
                    normal[j][4] += row[j] * rhs;
                }
            }
        }

        match solve(normal) {
            Some([a, b, tx, ty]) => Self { a, b, tx, ty },
            None => Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 },
        }
    }

    /// Map an output pixel back into source coordinates.
    fn invert_point(&self, ox: f32, oy: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let dx = ox - self.tx;
        let dy = oy - self.ty;
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Gauss-Jordan elimination with partial pivoting on an augmented 4×5 matrix.
/// Returns `None` for a singular system.
#[allow(clippy::needless_range_loop)]
fn solve(mut m: [[f32; 5]; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for j in col..5 {
            m[col][j] /= pivot;
        }
        for row in 0..4 {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }
    Some([m[0][4], m[1][4], m[2][4], m[3][4]])
}

/// Bilinear sample of one pixel; out-of-bounds neighbours count as black.
fn sample_bilinear(image: &RgbImage, sx: f32, sy: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let fetch = |x: i64, y: i64| -> [f32; 3] {
        if x >= 0 && x < w && y >= 0 && y < h {
            let p = image.get_pixel(x as u32, y as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let (tl, tr) = (fetch(x0, y0), fetch(x0 + 1, y0));
    let (bl, br) = (fetch(x0, y0 + 1), fetch(x0 + 1, y0 + 1));
    let mut out = [0u8; 3];
    for c in 0..3 {
        let val = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
        out[c] = val.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Computes the similarity transform from the five detected landmarks to the
/// ArcFace reference positions and warps the face into the output crop.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        match transform.invert_point(ox as f32, oy as f32) {
            Some((sx, sy)) => sample_bilinear(image, sx, sy),
            None => Rgb([0, 0, 0]),
        }
    })
}

/// Resize a whole image (or crop) to 112×112 without alignment.
///
/// Used when no landmarks are available, e.g. when detection found nothing
/// and the full frame stands in for the face.
pub fn resize_face(image: &RgbImage) -> RgbImage {
    imageops::resize(image, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}
