use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::{routing::post, Json, Router};

use crate::error::{ApiError, Result};
use crate::staging::{self, StagingArea};
use crate::state::AppState;
use crate::translate::{self, VerificationResult};
use crate::upload::{self, Rejection, UploadedImage};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/verify", post(handler_verify))
}

async fn handler_verify(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<VerificationResult>> {
    let mut multipart = multipart.map_err(|err| {
        tracing::debug!(error = %err, "request is not a readable multipart body");
        Rejection::ReadError
    })?;
    let pair = upload::read_pair(&mut multipart).await?;
    upload::validate(&pair)?;

    let staging = StagingArea::acquire(state.staging_root.as_deref())
        .map_err(|err| ApiError::Internal(format!("cannot create staging area: {err}")))?;
    let path1 = stage(&staging, "img1", &pair.image1)?;
    let path2 = stage(&staging, "img2", &pair.image2)?;
    drop(pair);

    let comparer = Arc::clone(&state.comparer);
    let options = Arc::clone(&state.compare_options);
    let report = state
        .pool
        .run(move || {
            let report = comparer.compare(&path1, &path2, &options);
            staging.close();
            report
        })
        .await?
        .map_err(|err| ApiError::Engine(err.to_string()))?;

    let result = translate::translate(&report, &state.compare_options.model);
    tracing::info!(
        verified = result.verified,
        match_percentage = result.match_percentage,
        "verification completed"
    );
    Ok(Json(result))
}

fn stage(staging: &StagingArea, label: &str, image: &UploadedImage) -> Result<PathBuf> {
    let bytes = image.bytes().ok_or(Rejection::ReadError)?;
    let extension =
        staging::extension_for(image.file_name.as_deref(), image.content_type.as_deref());
    staging
        .write(label, bytes, &extension)
        .map_err(|err| ApiError::Internal(format!("cannot stage {}: {err}", image.field)))
}
