//! Per-request staging directory for uploaded images.
//!
//! The engine reads files, not buffers, so each verification writes its two
//! uploads into a fresh directory. The directory is removed when the
//! [`StagingArea`] is closed or dropped, including during unwinding.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

const DIR_PREFIX: &str = "faceverify-";
const MAX_EXTENSION_LEN: usize = 8;

pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh staging directory under `root`, or under the system
    /// temp dir when `root` is `None`.
    pub fn acquire(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(dir = %dir.path().display(), "staging area acquired");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` to `<label>_<uuid>.<extension>` inside the staging directory.
    pub fn write(&self, label: &str, bytes: &[u8], extension: &str) -> io::Result<PathBuf> {
        let path = self
            .dir
            .path()
            .join(format!("{label}_{}.{extension}", Uuid::new_v4()));
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(bytes)?;
        Ok(path)
    }

    /// Remove the directory now. Failures are logged, never raised: the
    /// verification outcome does not depend on cleanup.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(dir = %path.display(), "staging area removed"),
            Err(err) => {
                tracing::warn!(dir = %path.display(), error = %err, "failed to remove staging area")
            }
        }
    }
}

/// Pick the staged file extension: the uploaded file name's extension when
/// it is short and alphanumeric, otherwise one derived from the media type.
pub fn extension_for(file_name: Option<&str>, content_type: Option<&str>) -> String {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }

    let is_png = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("png"));
    if is_png { "png".to_string() } else { "jpg".to_string() }
}
