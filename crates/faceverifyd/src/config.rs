use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use faceverify_core::CompareOptions;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// Built from defaults, then an optional TOML file named by
/// `FACEVERIFY_CONFIG`, then `FACEVERIFY_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8001).
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database holding status records.
    pub db_path: PathBuf,
    /// Parent directory for per-request staging directories (default: system temp dir).
    pub staging_dir: Option<PathBuf>,
    /// Origins allowed by the CORS policy. `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Number of worker threads running face comparisons.
    pub workers: usize,
    /// Reject verifications once this many are queued or running. Unset = unbounded.
    pub max_pending: Option<usize>,
    /// Face detector passed to the engine.
    pub detector_backend: String,
    /// Maximum cosine distance reported as the same person.
    pub distance_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = faceverify_core::data_dir();
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8001)),
            model_dir: faceverify_core::default_model_dir(),
            db_path: data_dir.join("status.db"),
            staging_dir: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
            workers: 4,
            max_pending: None,
            detector_backend: "scrfd".to_string(),
            distance_threshold: 0.68,
        }
    }
}

impl Config {
    /// Load configuration from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("FACEVERIFY_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env(|key| std::env::var(key).ok()))
    }

    /// Parse a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `FACEVERIFY_*` overrides. Unparseable values keep the current setting.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.bind = env_parse(&lookup, "FACEVERIFY_BIND", self.bind);
        if let Some(dir) = lookup("FACEVERIFY_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("FACEVERIFY_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("FACEVERIFY_STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(dir));
        }
        if let Some(origins) = lookup("FACEVERIFY_CORS_ORIGINS") {
            self.cors_origins = split_origins(&origins);
        }
        self.workers = env_parse(&lookup, "FACEVERIFY_WORKERS", self.workers).max(1);
        if let Some(limit) = lookup("FACEVERIFY_MAX_PENDING").and_then(|v| v.trim().parse().ok()) {
            self.max_pending = Some(limit);
        }
        if let Some(backend) = lookup("FACEVERIFY_DETECTOR_BACKEND") {
            self.detector_backend = backend;
        }
        self.distance_threshold =
            env_parse(&lookup, "FACEVERIFY_DISTANCE_THRESHOLD", self.distance_threshold);
        self
    }

    /// Engine parameters fixed for this deployment.
    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            detector_backend: self.detector_backend.clone(),
            enforce_detection: false,
            distance_threshold: self.distance_threshold,
            ..CompareOptions::default()
        }
    }
}

/// Split a comma separated origin list, trimming whitespace and dropping empties.
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
