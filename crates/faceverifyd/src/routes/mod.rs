use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::upload::MAX_REQUEST_BYTES;

pub mod status;
pub mod verify;

pub const BANNER: &str = "FaceVerify AI - Face Verification Service";

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api", get(handler_root))
        .route("/api/", get(handler_root))
        .merge(verify::routes())
        .merge(status::routes())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS policy for the configured origins. Credentials are allowed, so
/// methods and headers are mirrored rather than wildcarded; `*` mirrors the
/// request origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        }))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn handler_root() -> Json<Value> {
    Json(json!({ "message": BANNER }))
}
