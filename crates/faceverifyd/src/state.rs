use std::path::PathBuf;
use std::sync::Arc;

use faceverify_core::{CompareOptions, FaceComparer};

use crate::store::StatusStore;
use crate::worker_pool::WorkerPool;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub comparer: Arc<dyn FaceComparer>,
    pub pool: Arc<WorkerPool>,
    pub store: StatusStore,
    pub compare_options: Arc<CompareOptions>,
    /// Parent of per-request staging directories; `None` = system temp dir.
    pub staging_root: Option<PathBuf>,
}
