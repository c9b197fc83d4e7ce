//! Upload validation for the two verification images.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Largest accepted image (5 MiB).
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Request body cap: two maximal images plus room for multipart framing.
/// Tripping it is reported as an oversized upload.
pub const MAX_REQUEST_BYTES: usize = 2 * MAX_UPLOAD_BYTES + 1024 * 1024;

pub const ACCEPTED_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// Why an upload pair was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing form field {0}")]
    MissingField(&'static str),
    #[error("unsupported media type")]
    UnsupportedType,
    #[error("upload exceeds 5 MiB")]
    TooLarge,
    #[error("upload could not be read")]
    ReadError,
}

#[derive(Debug, Clone)]
pub enum UploadBody {
    Complete(Bytes),
    /// More than `MAX_UPLOAD_BYTES` arrived; the rest was not buffered.
    Oversized,
    Unreadable(String),
}

/// One multipart file part.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub field: &'static str,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: UploadBody,
}

impl UploadedImage {
    pub fn has_accepted_type(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_ascii_lowercase())
            .is_some_and(|essence| ACCEPTED_TYPES.contains(&essence.as_str()))
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            UploadBody::Complete(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// The `image1` / `image2` pair of a verification request.
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub image1: UploadedImage,
    pub image2: UploadedImage,
}

/// Check both uploads. Media types are checked first, then sizes, then
/// read failures, so an oversized upload is reported as such whatever the
/// state of the other one.
pub fn validate(pair: &ImagePair) -> Result<(), Rejection> {
    let images = [&pair.image1, &pair.image2];

    if images.iter().any(|image| !image.has_accepted_type()) {
        return Err(Rejection::UnsupportedType);
    }
    if images.iter().any(|image| match &image.body {
        UploadBody::Oversized => true,
        UploadBody::Complete(bytes) => bytes.len() > MAX_UPLOAD_BYTES,
        UploadBody::Unreadable(_) => false,
    }) {
        return Err(Rejection::TooLarge);
    }
    if let Some(reason) = images.iter().find_map(|image| match &image.body {
        UploadBody::Unreadable(reason) => Some(reason),
        _ => None,
    }) {
        tracing::debug!(%reason, "upload unreadable");
        return Err(Rejection::ReadError);
    }
    Ok(())
}

/// Read the `image1` and `image2` parts of a multipart body in full.
///
/// Unknown fields are skipped and the first occurrence of each image field
/// wins. If the stream breaks on the body cap, or after an oversized part was
/// seen, the pair is refused as too large, otherwise as unreadable.
pub async fn read_pair(multipart: &mut Multipart) -> Result<ImagePair, Rejection> {
    let mut image1: Option<UploadedImage> = None;
    let mut image2: Option<UploadedImage> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) if image1.is_some() && image2.is_some() => {
                tracing::debug!(error = %err, "ignoring trailing multipart error");
                break;
            }
            Err(err) => {
                tracing::debug!(error = %err, "multipart stream failed");
                let oversized = exceeds_body_limit(&err)
                    || [&image1, &image2].iter().any(|slot| {
                        matches!(slot, Some(UploadedImage { body: UploadBody::Oversized, .. }))
                    });
                return Err(if oversized { Rejection::TooLarge } else { Rejection::ReadError });
            }
        };

        let (slot, name) = match field.name() {
            Some("image1") => (&mut image1, "image1"),
            Some("image2") => (&mut image2, "image2"),
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(read_field(field, name).await);
        }
    }

    Ok(ImagePair {
        image1: image1.ok_or(Rejection::MissingField("image1"))?,
        image2: image2.ok_or(Rejection::MissingField("image2"))?,
    })
}

async fn read_field(mut field: Field<'_>, name: &'static str) -> UploadedImage {
    let file_name = field.file_name().map(str::to_owned);
    let content_type = field.content_type().map(str::to_owned);

    let mut buf = BytesMut::new();
    let body = loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if buf.len() + chunk.len() > MAX_UPLOAD_BYTES {
                    break UploadBody::Oversized;
                }
                buf.extend_from_slice(&chunk);
            }
            Ok(None) => break UploadBody::Complete(buf.freeze()),
            Err(err) if exceeds_body_limit(&err) => break UploadBody::Oversized,
            Err(err) => break UploadBody::Unreadable(err.to_string()),
        }
    };

    tracing::debug!(
        field = name,
        file_name = ?file_name,
        content_type = ?content_type,
        complete = matches!(body, UploadBody::Complete(_)),
        "upload part read"
    );

    UploadedImage {
        field: name,
        file_name,
        content_type,
        body,
    }
}

fn exceeds_body_limit(err: &MultipartError) -> bool {
    err.status() == StatusCode::PAYLOAD_TOO_LARGE
}
