//! Maps verification failures to client-facing messages.

use crate::upload::Rejection;

pub const MISSING_FIELD_DETAIL: &str = "Both image1 and image2 are required";
pub const UNSUPPORTED_TYPE_DETAIL: &str = "Only JPEG and PNG images are supported";
pub const TOO_LARGE_DETAIL: &str = "File size must be less than 5MB";
pub const READ_ERROR_DETAIL: &str = "Error reading uploaded files";
pub const NO_FACE_DETAIL: &str =
    "Face not detected in one or both images. Please use a clearer photo.";
pub const INTERNAL_DETAIL: &str = "An error occurred during face verification. Please try again.";

/// Engine messages meaning "no face in the input". Case-sensitive.
const NO_FACE_PATTERNS: &[&str] = &["Face could not be detected", "No face detected"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The client's photo has no usable face: 400.
    NoFaceDetected,
    /// Anything else: 500, with the original text kept out of the response.
    Internal,
}

impl FailureKind {
    pub fn detail(self) -> &'static str {
        match self {
            Self::NoFaceDetected => NO_FACE_DETAIL,
            Self::Internal => INTERNAL_DETAIL,
        }
    }
}

pub fn classify_engine_failure(message: &str) -> FailureKind {
    if NO_FACE_PATTERNS.iter().any(|pattern| message.contains(pattern)) {
        FailureKind::NoFaceDetected
    } else {
        FailureKind::Internal
    }
}

pub fn rejection_detail(rejection: Rejection) -> &'static str {
    match rejection {
        Rejection::MissingField(_) => MISSING_FIELD_DETAIL,
        Rejection::UnsupportedType => UNSUPPORTED_TYPE_DETAIL,
        Rejection::TooLarge => TOO_LARGE_DETAIL,
        Rejection::ReadError => READ_ERROR_DETAIL,
    }
}
